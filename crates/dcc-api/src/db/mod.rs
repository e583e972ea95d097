//! # Database Persistence Layer
//!
//! Postgres backends for the storage traits in [`crate::store`], via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, the
//! server persists registrations, lab claims and sweep leases to
//! PostgreSQL. When absent, it runs on the in-memory stores (suitable for
//! development and testing).
//!
//! Each module exposes free functions taking a `&PgPool`, plus a thin
//! struct implementing the matching store trait on top of them.

pub mod claims;
pub mod leases;
pub mod registrations;

pub use claims::PgClaimStore;
pub use leases::PgSweepLease;
pub use registrations::PgRegistrationStore;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::store::StoreError;

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set, running in-memory only mode. \
                 Registrations will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    // Run embedded migrations.
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Map a driver error onto [`StoreError`], keeping unique violations typed.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::UniqueViolation {
            constraint: db.constraint().unwrap_or("unknown").to_string(),
        },
        sqlx::Error::RowNotFound => StoreError::NotFound,
        _ => StoreError::Backend(err.to_string()),
    }
}
