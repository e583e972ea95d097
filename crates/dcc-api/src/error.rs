//! # Service Error Types
//!
//! [`DccError`] is the single failure type of every service operation. Each
//! variant maps one-to-one onto an HTTP status and a machine-readable code,
//! so a perimeter router can return it directly via `IntoResponse`.
//! Storage and internal failures are logged but their messages are never
//! returned to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dcc_core::{DccErrorReason, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "TOKEN_NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Persisted failure reason, present for signing failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DccErrorReason>,
}

/// Failures of the registration, claim, signing and download operations.
#[derive(Error, Debug)]
pub enum DccError {
    /// A registration already holds this token (409).
    #[error("a registration already exists for this registration token")]
    DuplicateRegistrationToken,

    /// The verification server does not know the token (404).
    #[error("registration token not found")]
    TokenNotFound,

    /// The token is not eligible: forbidden or result still pending (403).
    #[error("registration token is not eligible for a DCC")]
    ForbiddenToken,

    /// An oracle failed at the server level (502).
    #[error("upstream service unavailable: {0}")]
    OracleUnavailable(String),

    /// Malformed lab upload (400).
    #[error("invalid payload encoding: {0}")]
    InvalidPayloadEncoding(String),

    /// The lab is claimed by another partner (409).
    #[error("lab {lab_id} is claimed by another partner")]
    ClaimConflict { lab_id: String },

    /// The partner holds its maximum number of lab claims (403).
    #[error("partner {partner_id} has reached its quota of {quota} lab claims")]
    QuotaExceeded { partner_id: String, quota: u32 },

    /// The signing service rejected the request (500).
    #[error("signing service rejected the request")]
    SigningClientError,

    /// The signing service failed (500).
    #[error("signing service failed")]
    SigningServerError,

    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Conflict with the current record state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The credential data is no longer available (410).
    #[error("gone: {0}")]
    Gone(String),

    /// Public key is not well-formed base64 (400).
    #[error("public key is not valid base64")]
    InvalidPublicKey,

    /// Storage failure (500). Message is logged but not returned to client.
    #[error("storage error: {0}")]
    Storage(StoreError),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DccError {
    /// Return the HTTP status code and machine-readable error code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::DuplicateRegistrationToken => (StatusCode::CONFLICT, "DUPLICATE_REGISTRATION_TOKEN"),
            Self::TokenNotFound => (StatusCode::NOT_FOUND, "TOKEN_NOT_FOUND"),
            Self::ForbiddenToken => (StatusCode::FORBIDDEN, "FORBIDDEN_TOKEN"),
            Self::OracleUnavailable(_) => (StatusCode::BAD_GATEWAY, "ORACLE_UNAVAILABLE"),
            Self::InvalidPayloadEncoding(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD_ENCODING"),
            Self::ClaimConflict { .. } => (StatusCode::CONFLICT, "CLAIM_CONFLICT"),
            Self::QuotaExceeded { .. } => (StatusCode::FORBIDDEN, "QUOTA_EXCEEDED"),
            Self::SigningClientError => (StatusCode::INTERNAL_SERVER_ERROR, "SIGNING_CLIENT_ERROR"),
            Self::SigningServerError => (StatusCode::INTERNAL_SERVER_ERROR, "SIGNING_SERVER_ERROR"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Gone(_) => (StatusCode::GONE, "GONE"),
            Self::InvalidPublicKey => (StatusCode::BAD_REQUEST, "INVALID_PUBLIC_KEY"),
            Self::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// The reason persisted on the record by a failed signing attempt.
    pub fn reason(&self) -> Option<DccErrorReason> {
        match self {
            Self::SigningClientError => Some(DccErrorReason::SigningClientError),
            Self::SigningServerError => Some(DccErrorReason::SigningServerError),
            _ => None,
        }
    }

    fn is_internal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Internal(_))
    }
}

impl IntoResponse for DccError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Never expose internal error messages to clients.
        let message = if self.is_internal() {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        // Log internal errors for operator visibility.
        if self.is_internal() {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                reason: self.reason(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Optimistic-version conflicts are caller-visible; everything else from the
/// store is an internal failure.
impl From<StoreError> for DccError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => Self::Conflict(err.to_string()),
            other => Self::Storage(other),
        }
    }
}

/// Convert dcc-core validation errors on lab input to API errors.
impl From<ValidationError> for DccError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidPayloadEncoding(err.to_string())
    }
}
