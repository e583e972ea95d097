//! # Storage Abstractions
//!
//! The services never talk to a database directly. They hold trait objects
//! for the three stores below, and the binary picks the backend at startup:
//! Postgres when `DATABASE_URL` is set ([`crate::db`]), in-memory otherwise
//! ([`memory`]).
//!
//! ## Guarantees every backend provides
//!
//! - `registration_token`, `hashed_guid` and the claim `lab_id` are unique.
//!   A violation is reported as [`StoreError::UniqueViolation`] naming the
//!   constraint, never silently merged.
//! - [`RegistrationStore::save`] is optimistic: it succeeds only if the
//!   stored version equals the record's version, then bumps the version and
//!   refreshes `updated_at`.
//! - The retention operations are narrow and parameterized by a cutoff.
//!   They bump `version` on rows they touch so that a writer holding a stale
//!   copy cannot restore stripped data, but they leave `updated_at` alone so
//!   later stages still see the row's real age.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dcc_core::{DccRegistration, LabIdClaim, NewRegistration};
use thiserror::Error;
use uuid::Uuid;

/// Unique constraint on `dcc_registration.registration_token`.
pub const REGISTRATION_TOKEN_CONSTRAINT: &str = "dcc_registration_registration_token_key";
/// Unique constraint on `dcc_registration.hashed_guid`.
pub const HASHED_GUID_CONSTRAINT: &str = "dcc_registration_hashed_guid_key";
/// Unique constraint on `lab_id_claim.lab_id`.
pub const LAB_ID_CONSTRAINT: &str = "lab_id_claim_lab_id_key";

/// Storage failures.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("unique constraint {constraint} violated")]
    UniqueViolation {
        /// Constraint name.
        constraint: String,
    },

    /// The record was modified since it was read.
    #[error("record {id} was modified concurrently (expected version {expected})")]
    VersionConflict {
        /// Record id.
        id: Uuid,
        /// Version the caller held.
        expected: i64,
    },

    /// The record no longer exists.
    #[error("record not found")]
    NotFound,

    /// The backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this is a violation of the named unique constraint.
    pub fn violates(&self, name: &str) -> bool {
        matches!(self, Self::UniqueViolation { constraint } if constraint == name)
    }
}

/// Persistence for registration records.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Insert a new record. Assigns the id, version 0 and both timestamps.
    async fn insert(&self, new: NewRegistration) -> Result<DccRegistration, StoreError>;

    /// Optimistic save of a modified record. Returns the stored form.
    async fn save(&self, record: &DccRegistration) -> Result<DccRegistration, StoreError>;

    /// Point lookup by registration token.
    async fn find_by_registration_token(
        &self,
        registration_token: &str,
    ) -> Result<Option<DccRegistration>, StoreError>;

    /// Point lookup by hashed GUID.
    async fn find_by_hashed_guid(&self, hashed_guid: &str) -> Result<Option<DccRegistration>, StoreError>;

    /// All records for a lab.
    async fn find_by_lab_id(&self, lab_id: &str) -> Result<Vec<DccRegistration>, StoreError>;

    /// Stage 1: null the credential data of every record last updated
    /// before `cutoff`. Returns the number of rows changed.
    async fn strip_dcc_data(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Stage 2: null the registration token of every record created before
    /// `cutoff`. Returns the number of rows changed.
    async fn strip_registration_tokens(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Stage 3: delete every record last updated before `cutoff`. Returns
    /// the number of rows deleted.
    async fn delete_updated_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Persistence for lab claims.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Insert a claim. Fails with [`StoreError::UniqueViolation`] on
    /// [`LAB_ID_CONSTRAINT`] if the lab is already claimed.
    async fn insert(&self, claim: &LabIdClaim) -> Result<(), StoreError>;

    /// Lookup by lab id.
    async fn find_by_lab_id(&self, lab_id: &str) -> Result<Option<LabIdClaim>, StoreError>;

    /// Number of claims held by a partner.
    async fn count_by_partner(&self, partner_id: &str) -> Result<u64, StoreError>;

    /// Refresh `last_used` of a claim.
    async fn touch(&self, id: Uuid, last_used: DateTime<Utc>) -> Result<(), StoreError>;

    /// Delete every claim last used before `cutoff`.
    async fn delete_unused_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// A named, time-bounded lock shared by every instance of the server.
///
/// Acquisition succeeds when no lease row exists for the name or the
/// existing one has run out (`lock_until <= now`). A crashed holder's lease
/// therefore expires on its own after the hold time.
#[async_trait]
pub trait SweepLease: Send + Sync {
    /// Try to take the lease until `lock_until`. Returns whether it was taken.
    async fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Give the lease back early by setting its expiry to `now`.
    async fn release(&self, name: &str, holder: &str, now: DateTime<Utc>) -> Result<(), StoreError>;
}
