//! Typed client for the signing service.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/api/certify/v2/issue/hash` | Sign a base64 hash, returns COSE bytes |
//!
//! The request body is the base64 hash as `text/plain`; the response is the
//! raw `application/cbor` signed object. No retry happens here. The signing
//! orchestrator owns the attempt budget.

use async_trait::async_trait;

use crate::error::ClientError;

const ISSUE_HASH_PATH: &str = "api/certify/v2/issue/hash";

/// Signs payload hashes.
#[async_trait]
pub trait SigningOracle: Send + Sync {
    /// Request a signed COSE object for `hash_b64`.
    async fn sign_hash(&self, hash_b64: &str) -> Result<Vec<u8>, ClientError>;
}

/// HTTP client for the signing service.
#[derive(Debug, Clone)]
pub struct SigningClient {
    http: reqwest::Client,
    base_url: url::Url,
}

impl SigningClient {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl SigningOracle for SigningClient {
    /// Calls `POST {base_url}/api/certify/v2/issue/hash`.
    async fn sign_hash(&self, hash_b64: &str) -> Result<Vec<u8>, ClientError> {
        let endpoint = "POST /api/certify/v2/issue/hash";
        let url = crate::join_url(&self.base_url, ISSUE_HASH_PATH);

        let resp = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .header(reqwest::header::ACCEPT, "application/cbor")
            .body(hash_b64.to_string())
            .send()
            .await
            .map_err(|e| ClientError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            return Err(ClientError::ApiError {
                endpoint: endpoint.into(),
                status,
                body,
            });
        }

        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ClientError::Deserialization {
                endpoint: endpoint.into(),
                source: e,
            })
    }
}
