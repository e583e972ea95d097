//! Lab claim persistence operations on the `lab_id_claim` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dcc_core::LabIdClaim;
use sqlx::PgPool;
use uuid::Uuid;

use super::store_error;
use crate::store::{ClaimStore, StoreError};

/// Insert a new claim. The `lab_id` unique constraint rejects a second
/// claim for the same lab.
pub async fn insert(pool: &PgPool, claim: &LabIdClaim) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO lab_id_claim (id, created_at, last_used, lab_id, partner_id)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(claim.id)
    .bind(claim.created_at)
    .bind(claim.last_used)
    .bind(&claim.lab_id)
    .bind(&claim.partner_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch the claim on a lab.
pub async fn get_by_lab_id(pool: &PgPool, lab_id: &str) -> Result<Option<LabIdClaim>, sqlx::Error> {
    let row = sqlx::query_as::<_, ClaimRow>(
        "SELECT id, created_at, last_used, lab_id, partner_id FROM lab_id_claim WHERE lab_id = $1",
    )
    .bind(lab_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ClaimRow::into_record))
}

/// Count the claims held by a partner.
pub async fn count_by_partner(pool: &PgPool, partner_id: &str) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lab_id_claim WHERE partner_id = $1")
        .bind(partner_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Refresh `last_used`. Returns whether a row was updated.
pub async fn update_last_used(pool: &PgPool, id: Uuid, last_used: DateTime<Utc>) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE lab_id_claim SET last_used = $1 WHERE id = $2")
        .bind(last_used)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete claims last used before `cutoff`.
pub async fn delete_unused_before(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM lab_id_claim WHERE last_used < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct ClaimRow {
    id: Uuid,
    created_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
    lab_id: String,
    partner_id: String,
}

impl ClaimRow {
    fn into_record(self) -> LabIdClaim {
        LabIdClaim {
            id: self.id,
            created_at: self.created_at,
            last_used: self.last_used,
            lab_id: self.lab_id,
            partner_id: self.partner_id,
        }
    }
}

/// [`ClaimStore`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgClaimStore {
    pool: PgPool,
}

impl PgClaimStore {
    /// Wrap a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClaimStore for PgClaimStore {
    async fn insert(&self, claim: &LabIdClaim) -> Result<(), StoreError> {
        insert(&self.pool, claim).await.map_err(store_error)
    }

    async fn find_by_lab_id(&self, lab_id: &str) -> Result<Option<LabIdClaim>, StoreError> {
        get_by_lab_id(&self.pool, lab_id).await.map_err(store_error)
    }

    async fn count_by_partner(&self, partner_id: &str) -> Result<u64, StoreError> {
        let count = count_by_partner(&self.pool, partner_id).await.map_err(store_error)?;
        Ok(count.max(0) as u64)
    }

    async fn touch(&self, id: Uuid, last_used: DateTime<Utc>) -> Result<(), StoreError> {
        if update_last_used(&self.pool, id, last_used).await.map_err(store_error)? {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn delete_unused_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        delete_unused_before(&self.pool, cutoff).await.map_err(store_error)
    }
}
