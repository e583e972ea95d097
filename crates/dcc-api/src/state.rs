//! # Application State
//!
//! Wires the storage backends and oracle clients into the services. The
//! services are cheap to clone (every collaborator sits behind an `Arc`),
//! so [`AppState`] can be handed to the router and to background tasks.

use std::sync::Arc;

use dcc_client::{SigningOracle, VerificationOracle};
use dcc_core::{DcciGenerator, ValidationError};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use crate::config::DccConfig;
use crate::db::{PgClaimStore, PgRegistrationStore, PgSweepLease};
use crate::services::{LabClaimManager, LabUploadService, LifecycleManager, RetentionSweeper, SigningOrchestrator};
use crate::store::memory::{InMemoryClaimStore, InMemoryRegistrationStore, InMemorySweepLease};
use crate::store::{ClaimStore, RegistrationStore, SweepLease};

/// The three storage backends the services run on.
#[derive(Clone)]
pub struct Backends {
    pub registrations: Arc<dyn RegistrationStore>,
    pub claims: Arc<dyn ClaimStore>,
    pub lease: Arc<dyn SweepLease>,
}

impl Backends {
    /// Process-local stores. Data does not survive a restart and the sweep
    /// lease does not coordinate with other instances.
    pub fn in_memory() -> Self {
        Self {
            registrations: Arc::new(InMemoryRegistrationStore::new()),
            claims: Arc::new(InMemoryClaimStore::new()),
            lease: Arc::new(InMemorySweepLease::new()),
        }
    }

    /// Postgres-backed stores sharing one pool.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            registrations: Arc::new(PgRegistrationStore::new(pool.clone())),
            claims: Arc::new(PgClaimStore::new(pool.clone())),
            lease: Arc::new(PgSweepLease::new(pool)),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleManager>,
    pub claims: Arc<LabClaimManager>,
    pub signing: Arc<SigningOrchestrator>,
    pub uploads: Arc<LabUploadService>,
    pub sweeper: Arc<RetentionSweeper>,

    /// Present when running against Postgres; used by the readiness probe.
    pub db_pool: Option<PgPool>,

    /// Present when the Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,

    pub config: DccConfig,
}

impl AppState {
    /// Build every service.
    ///
    /// Fails if the configured DCCI prefix contains a character outside
    /// the checksum alphabet. This is the startup check; nothing is
    /// served with an invalid prefix.
    pub fn build(
        config: DccConfig,
        backends: Backends,
        verification: Arc<dyn VerificationOracle>,
        signing: Arc<dyn SigningOracle>,
    ) -> Result<Self, ValidationError> {
        let dcci = DcciGenerator::new(config.dcci_prefix.clone())?;

        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&backends.registrations),
            verification,
            dcci,
        ));
        let claims = Arc::new(LabClaimManager::new(
            Arc::clone(&backends.claims),
            config.lab_id_claim.claims_per_partner,
        ));
        let signing = Arc::new(SigningOrchestrator::new(Arc::clone(&lifecycle), signing));
        let uploads = Arc::new(LabUploadService::new(
            Arc::clone(&lifecycle),
            Arc::clone(&claims),
            Arc::clone(&signing),
        ));
        let sweeper = Arc::new(RetentionSweeper::new(
            backends.registrations,
            backends.claims,
            backends.lease,
            &config,
        ));

        Ok(Self {
            lifecycle,
            claims,
            signing,
            uploads,
            sweeper,
            db_pool: None,
            metrics: None,
            config,
        })
    }

    /// Attach the database pool checked by the readiness probe.
    pub fn with_db_pool(mut self, pool: PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    /// Attach the Prometheus handle rendered on `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
