//! # Registration Lifecycle
//!
//! [`LifecycleManager`] owns every write to a registration record. The
//! record's lifecycle position is derived from its populated fields (see
//! [`dcc_core::RegistrationState`]); this module only moves records
//! between positions:
//!
//! ```text
//! AwaitingKey --create--> AwaitingLabUpload --update--> AwaitingSigning
//!                                                        |        |
//!                                                   set_dcc    set_error
//!                                                        v        v
//!                                                     Signed    Failed --update--> AwaitingSigning
//! ```
//!
//! Every save is optimistic. A concurrent write to the same record surfaces
//! as [`DccError::Conflict`]; the caller re-reads if it needs to retry.

use std::sync::Arc;

use dcc_client::{ClientError, VerificationOracle};
use dcc_core::{DccErrorReason, DccRegistration, DcciGenerator, NewRegistration};
use dcc_crypto::is_base64;
use serde::{Deserialize, Serialize};

use crate::error::DccError;
use crate::services::token_prefix;
use crate::store::{RegistrationStore, HASHED_GUID_CONSTRAINT, REGISTRATION_TOKEN_CONSTRAINT};

/// A registration still waiting for its lab upload, as listed for a lab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPublicKey {
    /// The hashed GUID of the test.
    pub test_id: String,
    /// Credential identifier minted at registration.
    pub dcci: String,
    /// Caller public key, base64.
    pub public_key: String,
}

/// Registration state machine.
#[derive(Clone)]
pub struct LifecycleManager {
    store: Arc<dyn RegistrationStore>,
    verification: Arc<dyn VerificationOracle>,
    dcci: DcciGenerator,
}

impl LifecycleManager {
    /// Create a manager. `dcci` must already be validated.
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        verification: Arc<dyn VerificationOracle>,
        dcci: DcciGenerator,
    ) -> Self {
        Self {
            store,
            verification,
            dcci,
        }
    }

    /// Register a public key for a registration token.
    ///
    /// The token must be unknown to this server and resolve to a final
    /// test outcome at the verification server. Nothing is persisted on
    /// failure.
    pub async fn create_registration(
        &self,
        registration_token: &str,
        public_key: &str,
    ) -> Result<DccRegistration, DccError> {
        let token_log = token_prefix(registration_token);

        if !is_base64(public_key) {
            return Err(DccError::InvalidPublicKey);
        }

        if self
            .store
            .find_by_registration_token(registration_token)
            .await?
            .is_some()
        {
            tracing::info!(token = %token_log, "registration token already registered");
            return Err(DccError::DuplicateRegistrationToken);
        }

        let info = self
            .verification
            .resolve(registration_token)
            .await
            .map_err(|e| verification_error(&token_log, e))?;

        if info.test_result.is_pending() {
            tracing::info!(token = %token_log, result = ?info.test_result, "test result still pending");
            return Err(DccError::ForbiddenToken);
        }

        let new = NewRegistration {
            registration_token: registration_token.to_string(),
            public_key: public_key.to_string(),
            hashed_guid: info.test_id,
            lab_id: info.lab_id,
            dcci: self.dcci.new_dcci(),
        };

        let record = self.store.insert(new).await.map_err(|e| match e {
            e if e.violates(REGISTRATION_TOKEN_CONSTRAINT) => DccError::DuplicateRegistrationToken,
            e if e.violates(HASHED_GUID_CONSTRAINT) => {
                DccError::Conflict("a registration already exists for this test".into())
            }
            e => DccError::from(e),
        })?;

        crate::metrics::registration_created();
        tracing::info!(
            id = %record.id,
            token = %token_log,
            lab_id = record.lab_id.as_deref().unwrap_or(""),
            "registration created"
        );
        Ok(record)
    }

    /// Store a lab upload on the record. The caller validates the fields.
    pub async fn update_registration(
        &self,
        mut record: DccRegistration,
        dcc_hash: Option<String>,
        encrypted_payload: Option<String>,
        encrypted_key: Option<String>,
        partner_id: Option<String>,
    ) -> Result<DccRegistration, DccError> {
        record.apply_upload(dcc_hash, encrypted_payload, encrypted_key, partner_id);
        let saved = self.store.save(&record).await?;
        tracing::info!(id = %saved.id, state = %saved.state(), "registration updated");
        Ok(saved)
    }

    /// Mark the record failed. Clears the signed credential and the
    /// upload fields that led to the failure.
    pub async fn set_error(
        &self,
        mut record: DccRegistration,
        reason: DccErrorReason,
    ) -> Result<DccRegistration, DccError> {
        record.apply_error(reason);
        let saved = self.store.save(&record).await?;
        tracing::error!(id = %saved.id, reason = %reason, "registration failed");
        Ok(saved)
    }

    /// Store the signed credential (base64). Clears any earlier error.
    pub async fn set_dcc(&self, mut record: DccRegistration, dcc: String) -> Result<DccRegistration, DccError> {
        record.apply_dcc(dcc);
        let saved = self.store.save(&record).await?;
        tracing::info!(id = %saved.id, "registration signed");
        Ok(saved)
    }

    /// Look up a record by hashed GUID.
    pub async fn find_by_hashed_guid(&self, hashed_guid: &str) -> Result<Option<DccRegistration>, DccError> {
        let found = self.store.find_by_hashed_guid(hashed_guid).await?;
        tracing::debug!(hashed_guid, found = found.is_some(), "lookup by hashed guid");
        Ok(found)
    }

    /// Look up a record by registration token.
    pub async fn find_by_registration_token(
        &self,
        registration_token: &str,
    ) -> Result<Option<DccRegistration>, DccError> {
        let found = self.store.find_by_registration_token(registration_token).await?;
        tracing::debug!(
            token = %token_prefix(registration_token),
            found = found.is_some(),
            "lookup by registration token"
        );
        Ok(found)
    }

    /// Public keys of the lab's registrations that have no upload yet.
    pub async fn search_pending_public_keys(&self, lab_id: &str) -> Result<Vec<PendingPublicKey>, DccError> {
        let records = self.store.find_by_lab_id(lab_id).await?;
        let pending: Vec<PendingPublicKey> = records
            .into_iter()
            .filter(|r| r.dcc_hash.is_none())
            .filter_map(|r| {
                Some(PendingPublicKey {
                    test_id: r.hashed_guid?,
                    dcci: r.dcci?,
                    public_key: r.public_key?,
                })
            })
            .collect();
        tracing::debug!(lab_id, count = pending.len(), "pending public keys");
        Ok(pending)
    }
}

/// Map a verification server failure onto the caller-visible taxonomy.
fn verification_error(token_log: &str, err: ClientError) -> DccError {
    match err.status() {
        Some(403) => {
            tracing::info!(token = %token_log, "verification server refused token");
            DccError::ForbiddenToken
        }
        Some(404) => {
            tracing::info!(token = %token_log, "verification server does not know token");
            DccError::TokenNotFound
        }
        _ => {
            tracing::error!(token = %token_log, error = %err, "verification server failed");
            DccError::OracleUnavailable(err.to_string())
        }
    }
}
