//! # Signing Orchestration
//!
//! Turns an uploaded payload hash into a signed credential. The signing
//! service is called at most twice per [`SigningOrchestrator::sign`]: one
//! attempt and one immediate retry. When both fail, the failure is
//! persisted on the record with a reason classified by the last answer's
//! status class, and the typed error is returned.

use std::sync::Arc;

use dcc_client::{retry_bounded, ClientError, SigningOracle};
use dcc_core::{DccErrorReason, DccRegistration};
use dcc_crypto::{encode_base64, hex_hash_to_base64};

use crate::error::DccError;
use crate::services::LifecycleManager;

/// Total signing attempts per call.
pub const MAX_SIGN_ATTEMPTS: u32 = 2;

/// Signs uploaded registrations.
#[derive(Clone)]
pub struct SigningOrchestrator {
    lifecycle: Arc<LifecycleManager>,
    signing: Arc<dyn SigningOracle>,
}

impl SigningOrchestrator {
    /// Create an orchestrator.
    pub fn new(lifecycle: Arc<LifecycleManager>, signing: Arc<dyn SigningOracle>) -> Self {
        Self { lifecycle, signing }
    }

    /// Sign the record's `dcc_hash` and store the result.
    ///
    /// Requires `dcc_hash` to be set and `dcc` to be empty.
    pub async fn sign(&self, record: DccRegistration) -> Result<DccRegistration, DccError> {
        let Some(dcc_hash) = record.dcc_hash.as_deref() else {
            return Err(DccError::Conflict("registration has no uploaded DCC hash".into()));
        };
        if record.dcc.is_some() {
            return Err(DccError::Conflict("registration is already signed".into()));
        }

        let hash_b64 =
            hex_hash_to_base64(dcc_hash).map_err(|e| DccError::InvalidPayloadEncoding(e.to_string()))?;

        let result = retry_bounded(MAX_SIGN_ATTEMPTS, |attempt| {
            let signing = Arc::clone(&self.signing);
            let hash_b64 = hash_b64.clone();
            async move {
                let result = signing.sign_hash(&hash_b64).await;
                crate::metrics::sign_attempt(if result.is_ok() { "success" } else { "failure" });
                tracing::debug!(attempt, ok = result.is_ok(), "signing attempt");
                result
            }
        })
        .await;

        match result {
            Ok(signed) => self.lifecycle.set_dcc(record, encode_base64(signed)).await,
            Err(err) => {
                let reason = classify(&err);
                let id = record.id;
                tracing::error!(%id, error = %err, reason = %reason, "signing failed");
                if let Err(e) = self.lifecycle.set_error(record, reason).await {
                    tracing::warn!(%id, error = %e, "failed to persist signing failure");
                }
                Err(match reason {
                    DccErrorReason::SigningClientError => DccError::SigningClientError,
                    _ => DccError::SigningServerError,
                })
            }
        }
    }
}

/// 4xx answers are the caller's fault, everything else the service's.
fn classify(err: &ClientError) -> DccErrorReason {
    if err.is_client_error() {
        DccErrorReason::SigningClientError
    } else {
        DccErrorReason::SigningServerError
    }
}
