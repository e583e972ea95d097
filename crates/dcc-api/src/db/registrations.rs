//! Registration persistence operations.
//!
//! All functions take a `&PgPool` and operate on the `dcc_registration`
//! table. Lifecycle rules live in the services; SQL only enforces
//! uniqueness and the optimistic version check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dcc_core::{DccErrorReason, DccRegistration, NewRegistration};
use sqlx::PgPool;
use uuid::Uuid;

use super::store_error;
use crate::store::{RegistrationStore, StoreError};

const COLUMNS: &str = "id, version, created_at, updated_at, hashed_guid, lab_id, partner_id, \
     registration_token, dcci, public_key, encrypted_data_encryption_key, dcc_hash, \
     dcc_encrypted_payload, dcc, error";

/// Insert a new registration.
pub async fn insert(pool: &PgPool, record: &DccRegistration) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO dcc_registration (id, version, created_at, updated_at, hashed_guid, lab_id,
             registration_token, dcci, public_key)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(record.id)
    .bind(record.version)
    .bind(record.created_at)
    .bind(record.updated_at)
    .bind(&record.hashed_guid)
    .bind(&record.lab_id)
    .bind(&record.registration_token)
    .bind(&record.dcci)
    .bind(&record.public_key)
    .execute(pool)
    .await?;

    Ok(())
}

/// Write every mutable column if the stored version still matches.
///
/// Returns the stored record, or `None` when no row matched `id` and
/// `version`.
pub async fn update_versioned(
    pool: &PgPool,
    record: &DccRegistration,
    updated_at: DateTime<Utc>,
) -> Result<Option<DccRegistration>, sqlx::Error> {
    let sql = format!(
        "UPDATE dcc_registration SET
             version = version + 1, updated_at = $3, hashed_guid = $4, lab_id = $5,
             partner_id = $6, registration_token = $7, dcci = $8, public_key = $9,
             encrypted_data_encryption_key = $10, dcc_hash = $11,
             dcc_encrypted_payload = $12, dcc = $13, error = $14
         WHERE id = $1 AND version = $2
         RETURNING {COLUMNS}"
    );
    let row = sqlx::query_as::<_, RegistrationRow>(&sql)
        .bind(record.id)
        .bind(record.version)
        .bind(updated_at)
        .bind(&record.hashed_guid)
        .bind(&record.lab_id)
        .bind(&record.partner_id)
        .bind(&record.registration_token)
        .bind(&record.dcci)
        .bind(&record.public_key)
        .bind(&record.encrypted_data_encryption_key)
        .bind(&record.dcc_hash)
        .bind(&record.dcc_encrypted_payload)
        .bind(&record.dcc)
        .bind(record.error.map(|e| e.as_str()))
        .fetch_optional(pool)
        .await?;

    Ok(row.map(RegistrationRow::into_record))
}

/// Whether a registration with `id` exists.
pub async fn exists(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM dcc_registration WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Fetch a registration by an indexed text column.
async fn find_one_by(pool: &PgPool, column: &str, value: &str) -> Result<Option<DccRegistration>, sqlx::Error> {
    let sql = format!("SELECT {COLUMNS} FROM dcc_registration WHERE {column} = $1");
    let row = sqlx::query_as::<_, RegistrationRow>(&sql)
        .bind(value)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(RegistrationRow::into_record))
}

/// Fetch a registration by registration token.
pub async fn get_by_registration_token(pool: &PgPool, token: &str) -> Result<Option<DccRegistration>, sqlx::Error> {
    find_one_by(pool, "registration_token", token).await
}

/// Fetch a registration by hashed GUID.
pub async fn get_by_hashed_guid(pool: &PgPool, hashed_guid: &str) -> Result<Option<DccRegistration>, sqlx::Error> {
    find_one_by(pool, "hashed_guid", hashed_guid).await
}

/// List every registration for a lab, oldest first.
pub async fn list_by_lab_id(pool: &PgPool, lab_id: &str) -> Result<Vec<DccRegistration>, sqlx::Error> {
    let sql = format!("SELECT {COLUMNS} FROM dcc_registration WHERE lab_id = $1 ORDER BY created_at");
    let rows = sqlx::query_as::<_, RegistrationRow>(&sql)
        .bind(lab_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(RegistrationRow::into_record).collect())
}

/// Stage 1: null credential data on rows last updated before `cutoff`.
pub async fn strip_dcc_data(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE dcc_registration SET
             public_key = NULL, dcc = NULL, encrypted_data_encryption_key = NULL,
             error = NULL, hashed_guid = NULL, dcc_encrypted_payload = NULL,
             version = version + 1
         WHERE updated_at < $1
           AND (public_key IS NOT NULL OR dcc IS NOT NULL
                OR encrypted_data_encryption_key IS NOT NULL OR error IS NOT NULL
                OR hashed_guid IS NOT NULL OR dcc_encrypted_payload IS NOT NULL)",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Stage 2: null the registration token on rows created before `cutoff`.
pub async fn strip_registration_tokens(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE dcc_registration SET registration_token = NULL, version = version + 1
         WHERE created_at < $1 AND registration_token IS NOT NULL",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Stage 3: delete rows last updated before `cutoff`.
pub async fn delete_updated_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM dcc_registration WHERE updated_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct RegistrationRow {
    id: Uuid,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    hashed_guid: Option<String>,
    lab_id: Option<String>,
    partner_id: Option<String>,
    registration_token: Option<String>,
    dcci: Option<String>,
    public_key: Option<String>,
    encrypted_data_encryption_key: Option<String>,
    dcc_hash: Option<String>,
    dcc_encrypted_payload: Option<String>,
    dcc: Option<String>,
    error: Option<String>,
}

impl RegistrationRow {
    fn into_record(self) -> DccRegistration {
        let error = self.error.as_deref().and_then(|raw| {
            let parsed = DccErrorReason::parse(raw);
            if parsed.is_none() {
                tracing::warn!(id = %self.id, error = raw, "unknown error reason in database, ignoring");
            }
            parsed
        });

        DccRegistration {
            id: self.id,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            hashed_guid: self.hashed_guid,
            lab_id: self.lab_id,
            partner_id: self.partner_id,
            registration_token: self.registration_token,
            dcci: self.dcci,
            public_key: self.public_key,
            encrypted_data_encryption_key: self.encrypted_data_encryption_key,
            dcc_hash: self.dcc_hash,
            dcc_encrypted_payload: self.dcc_encrypted_payload,
            dcc: self.dcc,
            error,
        }
    }
}

/// [`RegistrationStore`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgRegistrationStore {
    pool: PgPool,
}

impl PgRegistrationStore {
    /// Wrap a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationStore for PgRegistrationStore {
    async fn insert(&self, new: NewRegistration) -> Result<DccRegistration, StoreError> {
        let record = DccRegistration::from_new(Uuid::new_v4(), new, Utc::now());
        insert(&self.pool, &record).await.map_err(store_error)?;
        Ok(record)
    }

    async fn save(&self, record: &DccRegistration) -> Result<DccRegistration, StoreError> {
        let saved = update_versioned(&self.pool, record, Utc::now())
            .await
            .map_err(store_error)?;
        if let Some(saved) = saved {
            return Ok(saved);
        }
        if exists(&self.pool, record.id).await.map_err(store_error)? {
            Err(StoreError::VersionConflict {
                id: record.id,
                expected: record.version,
            })
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn find_by_registration_token(
        &self,
        registration_token: &str,
    ) -> Result<Option<DccRegistration>, StoreError> {
        get_by_registration_token(&self.pool, registration_token)
            .await
            .map_err(store_error)
    }

    async fn find_by_hashed_guid(&self, hashed_guid: &str) -> Result<Option<DccRegistration>, StoreError> {
        get_by_hashed_guid(&self.pool, hashed_guid).await.map_err(store_error)
    }

    async fn find_by_lab_id(&self, lab_id: &str) -> Result<Vec<DccRegistration>, StoreError> {
        list_by_lab_id(&self.pool, lab_id).await.map_err(store_error)
    }

    async fn strip_dcc_data(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        strip_dcc_data(&self.pool, cutoff).await.map_err(store_error)
    }

    async fn strip_registration_tokens(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        strip_registration_tokens(&self.pool, cutoff).await.map_err(store_error)
    }

    async fn delete_updated_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        delete_updated_before(&self.pool, cutoff).await.map_err(store_error)
    }
}
