//! Sweep lease persistence on the `sweep_lease` table.
//!
//! Acquisition is a single upsert: insert the row, or take over an existing
//! one whose `lock_until` has passed. Exactly one competing instance sees a
//! row affected.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::store_error;
use crate::store::{StoreError, SweepLease};

/// Take the lease `name` until `lock_until`. Returns whether it was taken.
pub async fn try_acquire(
    pool: &PgPool,
    name: &str,
    holder: &str,
    now: DateTime<Utc>,
    lock_until: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO sweep_lease (name, lock_until, locked_at, locked_by)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (name) DO UPDATE
             SET lock_until = EXCLUDED.lock_until,
                 locked_at = EXCLUDED.locked_at,
                 locked_by = EXCLUDED.locked_by
             WHERE sweep_lease.lock_until <= EXCLUDED.locked_at",
    )
    .bind(name)
    .bind(lock_until)
    .bind(now)
    .bind(holder)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Release the lease if `holder` still owns it.
pub async fn release(pool: &PgPool, name: &str, holder: &str, now: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE sweep_lease SET lock_until = GREATEST($3, locked_at)
         WHERE name = $1 AND locked_by = $2",
    )
    .bind(name)
    .bind(holder)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// [`SweepLease`] backed by Postgres, shared by every server instance.
#[derive(Debug, Clone)]
pub struct PgSweepLease {
    pool: PgPool,
}

impl PgSweepLease {
    /// Wrap a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SweepLease for PgSweepLease {
    async fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        now: DateTime<Utc>,
        lock_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        try_acquire(&self.pool, name, holder, now, lock_until)
            .await
            .map_err(store_error)
    }

    async fn release(&self, name: &str, holder: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        release(&self.pool, name, holder, now).await.map_err(store_error)
    }
}
