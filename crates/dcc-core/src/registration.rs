//! # DCC Registration Record
//!
//! One record per credential in progress. The lifecycle is not stored as a
//! column; it is derived from which fields are populated.
//!
//! ## States
//!
//! ```text
//! AwaitingKey ─create──▶ AwaitingLabUpload ─upload──▶ AwaitingSigning
//!                                                      │         │
//!                                              sign ok │         │ sign failed
//!                                                      ▼         ▼
//!                                                   Signed     Failed
//!                                                                │
//!                                        re-upload ──────────────┘
//!                                        (back to AwaitingSigning)
//! ```
//!
//! Retention strips data from any state. A stripped record that had been
//! uploaded keeps its `dcc_hash` and reports [`RegistrationState::Expired`].
//!
//! ## Invariants
//!
//! - `dcc` and `error` are never both set. [`DccRegistration::apply_error`]
//!   clears `dcc`; [`DccRegistration::apply_dcc`] clears `error`.
//! - `dcc_hash` set means a lab upload happened; `dcc` set means signing
//!   succeeded for that hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why credential creation failed for a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DccErrorReason {
    /// The signing service rejected the request (4xx).
    SigningClientError,
    /// The signing service failed or was unreachable.
    SigningServerError,
    /// The lab uploaded malformed data.
    LabInvalidResponse,
}

impl DccErrorReason {
    /// The persisted string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SigningClientError => "SIGNING_CLIENT_ERROR",
            Self::SigningServerError => "SIGNING_SERVER_ERROR",
            Self::LabInvalidResponse => "LAB_INVALID_RESPONSE",
        }
    }

    /// Parse the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SIGNING_CLIENT_ERROR" => Some(Self::SigningClientError),
            "SIGNING_SERVER_ERROR" => Some(Self::SigningServerError),
            "LAB_INVALID_RESPONSE" => Some(Self::LabInvalidResponse),
            _ => None,
        }
    }
}

impl std::fmt::Display for DccErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle position of a registration, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationState {
    /// No public key present.
    AwaitingKey,
    /// Public key present, no lab upload yet.
    AwaitingLabUpload,
    /// Lab upload present, not yet signed.
    AwaitingSigning,
    /// Signed credential present.
    Signed,
    /// Signing or upload failed; a re-upload is accepted.
    Failed,
    /// Retention removed the credential data; only bookkeeping remains.
    Expired,
}

impl RegistrationState {
    /// Whether no lifecycle operation moves the record any further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Signed | Self::Expired)
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingKey => "AWAITING_KEY",
            Self::AwaitingLabUpload => "AWAITING_LAB_UPLOAD",
            Self::AwaitingSigning => "AWAITING_SIGNING",
            Self::Signed => "SIGNED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// Fields supplied when a registration is first persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRegistration {
    /// Token binding the test outcome to this request. Unique.
    pub registration_token: String,
    /// Caller public key, base64.
    pub public_key: String,
    /// Pseudonymous test identifier from the verification server. Unique.
    pub hashed_guid: Option<String>,
    /// Lab that processes the test.
    pub lab_id: Option<String>,
    /// Minted credential identifier.
    pub dcci: String,
}

/// A credential-in-progress as persisted by the registration store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DccRegistration {
    /// Primary key.
    pub id: Uuid,
    /// Optimistic-concurrency counter, bumped by every save.
    pub version: i64,
    /// Set once at insert.
    pub created_at: DateTime<Utc>,
    /// Refreshed by every save.
    pub updated_at: DateTime<Utc>,
    /// Pseudonymous test identifier.
    pub hashed_guid: Option<String>,
    /// Lab identifier.
    pub lab_id: Option<String>,
    /// Partner that uploaded the result.
    pub partner_id: Option<String>,
    /// Registration token.
    pub registration_token: Option<String>,
    /// Minted credential identifier.
    pub dcci: Option<String>,
    /// Caller public key, base64.
    pub public_key: Option<String>,
    /// Data encryption key encrypted with `public_key`, base64.
    pub encrypted_data_encryption_key: Option<String>,
    /// Hex digest of the plaintext payload.
    pub dcc_hash: Option<String>,
    /// Encrypted payload, base64.
    pub dcc_encrypted_payload: Option<String>,
    /// Signed credential object with placeholder payload, base64.
    pub dcc: Option<String>,
    /// Failure reason, mutually exclusive with `dcc`.
    pub error: Option<DccErrorReason>,
}

impl DccRegistration {
    /// Build the in-memory form of a freshly inserted record.
    pub fn from_new(id: Uuid, new: NewRegistration, now: DateTime<Utc>) -> Self {
        Self {
            id,
            version: 0,
            created_at: now,
            updated_at: now,
            hashed_guid: new.hashed_guid,
            lab_id: new.lab_id,
            partner_id: None,
            registration_token: Some(new.registration_token),
            dcci: Some(new.dcci),
            public_key: Some(new.public_key),
            encrypted_data_encryption_key: None,
            dcc_hash: None,
            dcc_encrypted_payload: None,
            dcc: None,
            error: None,
        }
    }

    /// Derive the lifecycle position from the populated fields.
    pub fn state(&self) -> RegistrationState {
        if self.dcc.is_some() {
            RegistrationState::Signed
        } else if self.dcc_hash.is_some() {
            if self.public_key.is_some() {
                RegistrationState::AwaitingSigning
            } else {
                RegistrationState::Expired
            }
        } else if self.error.is_some() {
            RegistrationState::Failed
        } else if self.public_key.is_some() {
            RegistrationState::AwaitingLabUpload
        } else {
            RegistrationState::AwaitingKey
        }
    }

    /// Record a lab upload.
    pub fn apply_upload(
        &mut self,
        dcc_hash: Option<String>,
        encrypted_payload: Option<String>,
        encrypted_key: Option<String>,
        partner_id: Option<String>,
    ) {
        self.dcc_hash = dcc_hash;
        self.dcc_encrypted_payload = encrypted_payload;
        self.encrypted_data_encryption_key = encrypted_key;
        self.partner_id = partner_id;
    }

    /// Record a failure. Clears the signed credential and the now-stale
    /// upload fields.
    pub fn apply_error(&mut self, reason: DccErrorReason) {
        self.dcc = None;
        self.dcc_hash = None;
        self.partner_id = None;
        self.encrypted_data_encryption_key = None;
        self.error = Some(reason);
    }

    /// Record a signed credential. Clears any previous error.
    pub fn apply_dcc(&mut self, dcc: String) {
        self.error = None;
        self.dcc = Some(dcc);
    }

    /// Retention stage 1: drop credential data, keep bookkeeping.
    ///
    /// Keeps `dcci`, `lab_id`, `partner_id`, `dcc_hash`,
    /// `registration_token` and timestamps.
    pub fn strip_dcc_data(&mut self) {
        self.public_key = None;
        self.dcc = None;
        self.encrypted_data_encryption_key = None;
        self.error = None;
        self.hashed_guid = None;
        self.dcc_encrypted_payload = None;
    }

    /// Retention stage 2: drop the registration token only.
    pub fn strip_registration_token(&mut self) {
        self.registration_token = None;
    }
}
