//! # Lab Upload and Credential Download
//!
//! The two flows that combine the lifecycle, claim and signing services.
//!
//! **Upload** ([`LabUploadService::upload_dcc`]): a lab partner delivers the
//! payload hash, the encrypted payload and the encrypted data key for a
//! test. The partner must hold (or be able to take) the claim on the test's
//! lab. The upload is stored and signed in the same call.
//!
//! **Download** ([`LabUploadService::claim_dcc`]): the holder of the
//! registration token fetches the encrypted key and the signed credential
//! with the encrypted payload spliced in.

use std::sync::Arc;

use dcc_core::{DccErrorReason, DccHash, PartnerId};
use dcc_crypto::{is_base64, replace_dcc_payload};
use serde::{Deserialize, Serialize};

use crate::error::DccError;
use crate::services::{token_prefix, ClaimOutcome, LabClaimManager, LifecycleManager, SigningOrchestrator};

/// Longest accepted `encrypted_dcc`.
pub const MAX_ENCRYPTED_DCC_LEN: usize = 1000;
/// Longest accepted `data_encryption_key`.
pub const MAX_DATA_ENCRYPTION_KEY_LEN: usize = 255;

/// Lab upload body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DccUploadRequest {
    /// Hex SHA-256 of the plaintext payload.
    pub dcc_hash: String,
    /// Encrypted payload, base64.
    pub encrypted_dcc: String,
    /// Data encryption key encrypted with the registration's public key, base64.
    pub data_encryption_key: String,
}

/// Result of a credential download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DccClaim {
    /// The lab has not uploaded yet.
    Pending,
    /// The credential is ready.
    Ready {
        /// Encrypted data encryption key, base64.
        data_encryption_key: Option<String>,
        /// Signed credential with the encrypted payload, base64.
        dcc: String,
    },
}

/// Lab upload and credential download.
#[derive(Clone)]
pub struct LabUploadService {
    lifecycle: Arc<LifecycleManager>,
    claims: Arc<LabClaimManager>,
    signing: Arc<SigningOrchestrator>,
}

impl LabUploadService {
    /// Create the service.
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        claims: Arc<LabClaimManager>,
        signing: Arc<SigningOrchestrator>,
    ) -> Self {
        Self {
            lifecycle,
            claims,
            signing,
        }
    }

    /// Store and sign a lab upload for the test `hashed_guid`.
    ///
    /// Returns the signed credential (base64). If signing fails the
    /// upload is discarded and the record carries the failure reason.
    pub async fn upload_dcc(
        &self,
        hashed_guid: &str,
        partner_id: &str,
        request: DccUploadRequest,
    ) -> Result<String, DccError> {
        if !is_hashed_guid(hashed_guid) {
            return Err(DccError::InvalidPayloadEncoding(format!(
                "invalid test id: \"{hashed_guid}\""
            )));
        }
        let partner = PartnerId::new(partner_id)?;
        let dcc_hash = DccHash::new(request.dcc_hash)?;
        if request.encrypted_dcc.len() > MAX_ENCRYPTED_DCC_LEN {
            return Err(DccError::InvalidPayloadEncoding(format!(
                "encryptedDcc exceeds {MAX_ENCRYPTED_DCC_LEN} characters"
            )));
        }
        if request.data_encryption_key.len() > MAX_DATA_ENCRYPTION_KEY_LEN {
            return Err(DccError::InvalidPayloadEncoding(format!(
                "dataEncryptionKey exceeds {MAX_DATA_ENCRYPTION_KEY_LEN} characters"
            )));
        }

        let record = self
            .lifecycle
            .find_by_hashed_guid(hashed_guid)
            .await?
            .ok_or_else(|| DccError::NotFound(format!("test {hashed_guid}")))?;

        let Some(lab_id) = record.lab_id.clone() else {
            return Err(DccError::NotFound(format!("lab for test {hashed_guid}")));
        };
        match self.claims.get_or_create_claim(partner.as_str(), &lab_id).await? {
            ClaimOutcome::Granted => {}
            ClaimOutcome::Conflict => return Err(DccError::ClaimConflict { lab_id }),
            ClaimOutcome::QuotaExceeded => {
                return Err(DccError::QuotaExceeded {
                    partner_id: partner.as_str().to_string(),
                    quota: self.claims.quota(),
                })
            }
        }

        if record.dcc_hash.is_some() {
            return Err(DccError::Conflict(format!("DCC already uploaded for test {hashed_guid}")));
        }

        if !is_base64(&request.data_encryption_key) || !is_base64(&request.encrypted_dcc) {
            self.lifecycle
                .set_error(record, DccErrorReason::LabInvalidResponse)
                .await?;
            return Err(DccError::InvalidPayloadEncoding(
                "invalid base64 in dataEncryptionKey or encryptedDcc".into(),
            ));
        }

        let record = self
            .lifecycle
            .update_registration(
                record,
                Some(dcc_hash.into()),
                Some(request.encrypted_dcc),
                Some(request.data_encryption_key),
                Some(partner.as_str().to_string()),
            )
            .await?;
        let id = record.id;

        match self.signing.sign(record).await {
            Ok(signed) => signed
                .dcc
                .ok_or_else(|| DccError::Internal(format!("registration {id} signed without a DCC"))),
            Err(err) => {
                self.discard_failed_upload(hashed_guid, partner.as_str()).await;
                Err(err)
            }
        }
    }

    /// Fetch the credential for a registration token.
    pub async fn claim_dcc(&self, registration_token: &str) -> Result<DccClaim, DccError> {
        let record = self
            .lifecycle
            .find_by_registration_token(registration_token)
            .await?
            .ok_or_else(|| DccError::NotFound("registration token is not registered".into()))?;

        match (&record.encrypted_data_encryption_key, &record.dcc) {
            (None, None) => Ok(DccClaim::Pending),
            (Some(_), None) => {
                tracing::info!(token = %token_prefix(registration_token), "DCC already cleaned up");
                Err(DccError::Gone("DCC already cleaned up".into()))
            }
            (dek, Some(dcc)) => {
                let payload = record
                    .dcc_encrypted_payload
                    .as_deref()
                    .ok_or_else(|| DccError::Internal(format!("registration {} has no encrypted payload", record.id)))?;
                let dcc = replace_dcc_payload(dcc, payload)
                    .map_err(|e| DccError::Internal(format!("registration {}: {e}", record.id)))?;
                tracing::info!(id = %record.id, "DCC claimed");
                Ok(DccClaim::Ready {
                    data_encryption_key: dek.clone(),
                    dcc,
                })
            }
        }
    }

    /// Drop the encrypted payload of a record whose signing failed. The
    /// failure reason set by the orchestrator stays.
    async fn discard_failed_upload(&self, hashed_guid: &str, partner_id: &str) {
        let result = async {
            if let Some(record) = self.lifecycle.find_by_hashed_guid(hashed_guid).await? {
                self.lifecycle
                    .update_registration(record, None, None, None, Some(partner_id.to_string()))
                    .await?;
            }
            Ok::<(), DccError>(())
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(hashed_guid, error = %e, "failed to discard payload after signing failure");
        }
    }
}

/// 64 hex characters; the first may also be `x` or `X`.
fn is_hashed_guid(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 64
        && (bytes[0].is_ascii_hexdigit() || bytes[0] == b'x' || bytes[0] == b'X')
        && bytes[1..].iter().all(u8::is_ascii_hexdigit)
}
