//! # In-Memory Stores
//!
//! Development and test backends. State does not survive a restart.
//!
//! All operations are synchronous under a `parking_lot::RwLock` that is never
//! held across an `.await`. Uniqueness checks and the write they guard run
//! under one write lock, so two racing inserts for the same key cannot both
//! succeed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dcc_core::{DccRegistration, LabIdClaim, NewRegistration};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    ClaimStore, RegistrationStore, StoreError, SweepLease, HASHED_GUID_CONSTRAINT, LAB_ID_CONSTRAINT,
    REGISTRATION_TOKEN_CONSTRAINT,
};

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store keyed by id.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert `value` unless `conflict` reports a clash with an existing
    /// entry. The scan and the insert share one write lock.
    pub fn insert_unique(
        &self,
        id: Uuid,
        value: T,
        conflict: impl Fn(&T, &T) -> Option<&'static str>,
    ) -> Result<(), &'static str> {
        let mut guard = self.data.write();
        if let Some(constraint) = guard.values().find_map(|existing| conflict(existing, &value)) {
            return Err(constraint);
        }
        guard.insert(id, value);
        Ok(())
    }

    /// Run `f` with exclusive access to the whole map.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut HashMap<Uuid, T>) -> R) -> R {
        f(&mut self.data.write())
    }

    /// Retrieve a record by id.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// First record matching `pred`.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.data.read().values().find(|v| pred(v)).cloned()
    }

    /// All records matching `pred`.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.data.read().values().filter(|v| pred(v)).cloned().collect()
    }

    /// Number of records matching `pred`.
    pub fn count(&self, pred: impl Fn(&T) -> bool) -> usize {
        self.data.read().values().filter(|v| pred(v)).count()
    }

    /// Atomically read-validate-update a record.
    ///
    /// Returns `None` if the record doesn't exist, or `Some(result)` with
    /// the closure's `Result`.
    pub fn try_update<R, E>(&self, id: &Uuid, f: impl FnOnce(&mut T) -> Result<R, E>) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    /// Apply `f` to every record; `f` returns whether it changed the record.
    /// Returns the number of changed records.
    pub fn update_all(&self, mut f: impl FnMut(&mut T) -> bool) -> usize {
        let mut changed = 0;
        for value in self.data.write().values_mut() {
            if f(value) {
                changed += 1;
            }
        }
        changed
    }

    /// Remove every record matching `pred`. Returns how many were removed.
    pub fn remove_where(&self, pred: impl Fn(&T) -> bool) -> usize {
        let mut guard = self.data.write();
        let before = guard.len();
        guard.retain(|_, v| !pred(v));
        before - guard.len()
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn same(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x == y)
}

fn registration_conflict(existing: &DccRegistration, candidate: &DccRegistration) -> Option<&'static str> {
    if existing.id == candidate.id {
        None
    } else if same(&existing.registration_token, &candidate.registration_token) {
        Some(REGISTRATION_TOKEN_CONSTRAINT)
    } else if same(&existing.hashed_guid, &candidate.hashed_guid) {
        Some(HASHED_GUID_CONSTRAINT)
    } else {
        None
    }
}

fn has_dcc_data(r: &DccRegistration) -> bool {
    r.public_key.is_some()
        || r.dcc.is_some()
        || r.encrypted_data_encryption_key.is_some()
        || r.error.is_some()
        || r.hashed_guid.is_some()
        || r.dcc_encrypted_payload.is_some()
}

// -- Registrations ------------------------------------------------------------

/// In-memory [`RegistrationStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistrationStore {
    records: Store<DccRegistration>,
}

impl InMemoryRegistrationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fetch a record by id.
    pub fn get(&self, id: &Uuid) -> Option<DccRegistration> {
        self.records.get(id)
    }

    /// Overwrite the timestamps of a stored record, e.g. when importing
    /// records with known history. Returns whether the record exists.
    pub fn set_timestamps(&self, id: &Uuid, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> bool {
        self.records
            .try_update(id, |r| {
                r.created_at = created_at;
                r.updated_at = updated_at;
                Ok::<(), ()>(())
            })
            .is_some()
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn insert(&self, new: NewRegistration) -> Result<DccRegistration, StoreError> {
        let record = DccRegistration::from_new(Uuid::new_v4(), new, Utc::now());
        self.records
            .insert_unique(record.id, record.clone(), registration_conflict)
            .map_err(|constraint| StoreError::UniqueViolation {
                constraint: constraint.to_string(),
            })?;
        Ok(record)
    }

    async fn save(&self, record: &DccRegistration) -> Result<DccRegistration, StoreError> {
        self.records.with_write(|records| {
            if let Some(constraint) = records.values().find_map(|existing| registration_conflict(existing, record)) {
                return Err(StoreError::UniqueViolation {
                    constraint: constraint.to_string(),
                });
            }
            let stored = records.get_mut(&record.id).ok_or(StoreError::NotFound)?;
            if stored.version != record.version {
                return Err(StoreError::VersionConflict {
                    id: record.id,
                    expected: record.version,
                });
            }
            let mut next = record.clone();
            next.created_at = stored.created_at;
            next.version = stored.version + 1;
            next.updated_at = Utc::now();
            *stored = next.clone();
            Ok(next)
        })
    }

    async fn find_by_registration_token(
        &self,
        registration_token: &str,
    ) -> Result<Option<DccRegistration>, StoreError> {
        Ok(self
            .records
            .find(|r| r.registration_token.as_deref() == Some(registration_token)))
    }

    async fn find_by_hashed_guid(&self, hashed_guid: &str) -> Result<Option<DccRegistration>, StoreError> {
        Ok(self.records.find(|r| r.hashed_guid.as_deref() == Some(hashed_guid)))
    }

    async fn find_by_lab_id(&self, lab_id: &str) -> Result<Vec<DccRegistration>, StoreError> {
        let mut records = self.records.filter(|r| r.lab_id.as_deref() == Some(lab_id));
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn strip_dcc_data(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let changed = self.records.update_all(|r| {
            if r.updated_at < cutoff && has_dcc_data(r) {
                r.strip_dcc_data();
                r.version += 1;
                true
            } else {
                false
            }
        });
        Ok(changed as u64)
    }

    async fn strip_registration_tokens(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let changed = self.records.update_all(|r| {
            if r.created_at < cutoff && r.registration_token.is_some() {
                r.strip_registration_token();
                r.version += 1;
                true
            } else {
                false
            }
        });
        Ok(changed as u64)
    }

    async fn delete_updated_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.records.remove_where(|r| r.updated_at < cutoff) as u64)
    }
}

// -- Lab claims ---------------------------------------------------------------

/// In-memory [`ClaimStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryClaimStore {
    claims: Store<LabIdClaim>,
}

impl InMemoryClaimStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored claims.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn insert(&self, claim: &LabIdClaim) -> Result<(), StoreError> {
        self.claims
            .insert_unique(claim.id, claim.clone(), |existing, candidate| {
                (existing.lab_id == candidate.lab_id).then_some(LAB_ID_CONSTRAINT)
            })
            .map_err(|constraint| StoreError::UniqueViolation {
                constraint: constraint.to_string(),
            })
    }

    async fn find_by_lab_id(&self, lab_id: &str) -> Result<Option<LabIdClaim>, StoreError> {
        Ok(self.claims.find(|c| c.lab_id == lab_id))
    }

    async fn count_by_partner(&self, partner_id: &str) -> Result<u64, StoreError> {
        Ok(self.claims.count(|c| c.partner_id == partner_id) as u64)
    }

    async fn touch(&self, id: Uuid, last_used: DateTime<Utc>) -> Result<(), StoreError> {
        self.claims
            .try_update(&id, |c| {
                c.last_used = last_used;
                Ok(())
            })
            .unwrap_or(Err(StoreError::NotFound))
    }

    async fn delete_unused_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(self.claims.remove_where(|c| c.last_used < cutoff) as u64)
    }
}

// -- Sweep lease --------------------------------------------------------------

#[derive(Debug, Clone)]
struct LeaseRow {
    lock_until: DateTime<Utc>,
    locked_at: DateTime<Utc>,
    locked_by: String,
}

/// In-memory [`SweepLease`]. Only meaningful within one process.
#[derive(Debug, Clone, Default)]
pub struct InMemorySweepLease {
    rows: Arc<RwLock<HashMap<String, LeaseRow>>>,
}

impl InMemorySweepLease {
    /// Create an empty lease table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of `name`, if any row exists.
    pub fn holder(&self, name: &str) -> Option<(String, DateTime<Utc>)> {
        self.rows
            .read()
            .get(name)
            .map(|row| (row.locked_by.clone(), row.lock_until))
    }
}

#[async_trait]
impl SweepLease for InMemorySweepLease {
    async fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.write();
        if rows.get(name).is_some_and(|row| row.lock_until > now) {
            return Ok(false);
        }
        rows.insert(
            name.to_string(),
            LeaseRow {
                lock_until,
                locked_at: now,
                locked_by: holder.to_string(),
            },
        );
        Ok(true)
    }

    async fn release(&self, name: &str, holder: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(row) = self.rows.write().get_mut(name) {
            if row.locked_by == holder {
                row.lock_until = now.max(row.locked_at);
            }
        }
        Ok(())
    }
}
