//! # Retention Sweeper
//!
//! Stale registrations are erased in three stages, each a single narrow
//! store operation parameterized by a cutoff:
//!
//! | Stage | Selects                        | Effect                        |
//! |-------|--------------------------------|-------------------------------|
//! | 1     | `updated_at < now - dcc_data`  | credential data nulled        |
//! | 2     | `created_at < now - token`     | registration token nulled     |
//! | 3     | `updated_at < now - entity`    | record deleted                |
//!
//! A separate pass deletes lab claims unused for longer than the claim
//! maximum age.
//!
//! ## Cluster singleton
//!
//! Every instance runs the sweeper on the same interval. Each cycle first
//! takes a named [`SweepLease`]; instances that fail to take it skip the
//! cycle. The lease is released when the cycle ends, or expires on its own
//! after the configured hold time if the holder dies mid-cycle. The
//! registration stages and the claim pass use separate leases.
//!
//! The relative order of the three retention windows is not checked. With
//! `entity_days < dcc_data_days`, stage 3 deletes records before stage 1
//! would have stripped them.
//!
//! A window reaching past the earliest representable instant selects
//! nothing, so a very large day count keeps records forever. A hold time
//! past the latest representable instant is clamped to it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{CleanupConfig, DccConfig, CLAIM_CLEANUP_LEASE, ENTITY_CLEANUP_LEASE};
use crate::store::{ClaimStore, RegistrationStore, StoreError, SweepLease};

/// Rows affected by one sweep cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Whether this instance held the registration lease for the cycle.
    pub registrations_swept: bool,
    /// Whether this instance held the claim lease for the cycle.
    pub claims_swept: bool,
    /// Stage 1 rows.
    pub dcc_data_stripped: u64,
    /// Stage 2 rows.
    pub registration_tokens_stripped: u64,
    /// Stage 3 rows.
    pub registrations_deleted: u64,
    /// Claim pass rows.
    pub claims_deleted: u64,
    /// Stages that failed. Later stages still ran.
    pub failed_stages: Vec<&'static str>,
}

/// Periodic, lease-guarded retention job.
#[derive(Clone)]
pub struct RetentionSweeper {
    registrations: Arc<dyn RegistrationStore>,
    claims: Arc<dyn ClaimStore>,
    lease: Arc<dyn SweepLease>,
    cleanup: CleanupConfig,
    claim_max_age: Duration,
    holder: String,
    hold: Duration,
}

impl RetentionSweeper {
    /// Create a sweeper from the server configuration.
    pub fn new(
        registrations: Arc<dyn RegistrationStore>,
        claims: Arc<dyn ClaimStore>,
        lease: Arc<dyn SweepLease>,
        config: &DccConfig,
    ) -> Self {
        let holder = if config.lease.holder.is_empty() {
            format!("dcc-server-{}", Uuid::new_v4())
        } else {
            config.lease.holder.clone()
        };
        Self {
            registrations,
            claims,
            lease,
            cleanup: config.cleanup.clone(),
            claim_max_age: config.lab_id_claim.maximum_age(),
            holder,
            hold: config.lease.hold(),
        }
    }

    /// Identity this instance writes into lease rows.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Run the sweeper on its interval until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let rate = self.cleanup.rate();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(rate);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.run_cycle_at(Utc::now()).await {
                    Ok(report) if report.failed_stages.is_empty() => {
                        tracing::debug!(?report, "sweep cycle finished");
                    }
                    Ok(report) => {
                        tracing::warn!(failed = ?report.failed_stages, "sweep cycle finished with failures");
                    }
                    Err(e) => tracing::error!(error = %e, "sweep cycle skipped"),
                }
            }
        })
    }

    /// Run one cycle as of `now`.
    ///
    /// Fails only if a lease could not be read; stage failures are logged
    /// and listed in the report.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        if self.acquire(ENTITY_CLEANUP_LEASE, now).await? {
            report.registrations_swept = true;
            match self.strip_dcc_data(now).await {
                Ok(rows) => report.dcc_data_stripped = rows,
                Err(e) => stage_failed(&mut report, "dcc_data", e),
            }
            match self.strip_registration_tokens(now).await {
                Ok(rows) => report.registration_tokens_stripped = rows,
                Err(e) => stage_failed(&mut report, "registration_token", e),
            }
            match self.delete_expired(now).await {
                Ok(rows) => report.registrations_deleted = rows,
                Err(e) => stage_failed(&mut report, "entity", e),
            }
            self.release(ENTITY_CLEANUP_LEASE, now).await;
        }

        if self.acquire(CLAIM_CLEANUP_LEASE, now).await? {
            report.claims_swept = true;
            match self.sweep_claims(now).await {
                Ok(rows) => report.claims_deleted = rows,
                Err(e) => stage_failed(&mut report, "lab_id_claim", e),
            }
            self.release(CLAIM_CLEANUP_LEASE, now).await;
        }

        Ok(report)
    }

    /// Stage 1: strip credential data from records not updated within the
    /// data window.
    pub async fn strip_dcc_data(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let Some(before) = cutoff(now, self.cleanup.dcc_data_ttl()) else {
            return Ok(0);
        };
        let rows = self.registrations.strip_dcc_data(before).await?;
        record_stage("dcc_data", rows);
        Ok(rows)
    }

    /// Stage 2: strip registration tokens from records created before the
    /// token window.
    pub async fn strip_registration_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let Some(before) = cutoff(now, self.cleanup.registration_token_ttl()) else {
            return Ok(0);
        };
        let rows = self.registrations.strip_registration_tokens(before).await?;
        record_stage("registration_token", rows);
        Ok(rows)
    }

    /// Stage 3: delete records not updated within the entity window.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let Some(before) = cutoff(now, self.cleanup.entity_ttl()) else {
            return Ok(0);
        };
        let rows = self.registrations.delete_updated_before(before).await?;
        record_stage("entity", rows);
        Ok(rows)
    }

    /// Claim pass: delete claims unused for longer than the maximum age.
    pub async fn sweep_claims(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let Some(before) = cutoff(now, self.claim_max_age) else {
            return Ok(0);
        };
        let rows = self.claims.delete_unused_before(before).await?;
        record_stage("lab_id_claim", rows);
        Ok(rows)
    }

    async fn acquire(&self, name: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let acquired = self
            .lease
            .try_acquire(name, &self.holder, now, lease_expiry(now, self.hold))
            .await?;
        if !acquired {
            tracing::debug!(lease = name, "lease held by another instance, skipping");
        }
        Ok(acquired)
    }

    async fn release(&self, name: &str, now: DateTime<Utc>) {
        // An unreleased lease still expires after the hold time.
        if let Err(e) = self.lease.release(name, &self.holder, now).await {
            tracing::warn!(lease = name, error = %e, "failed to release lease");
        }
    }
}

/// `now - window`, or `None` when no instant is that old.
fn cutoff(now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(window)
}

fn lease_expiry(now: DateTime<Utc>, hold: Duration) -> DateTime<Utc> {
    now.checked_add_signed(hold).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn stage_failed(report: &mut SweepReport, stage: &'static str, err: StoreError) {
    tracing::error!(stage, error = %err, "retention stage failed");
    report.failed_stages.push(stage);
}

fn record_stage(stage: &'static str, rows: u64) {
    crate::metrics::sweeper_rows(stage, rows);
    if rows > 0 {
        tracing::info!(stage, rows, "retention stage applied");
    }
}
