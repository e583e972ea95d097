//! Typed client for the verification server.
//!
//! Resolves a registration token to the test outcome it is bound to.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/version/v1/testresult` | Resolve registration token |
//!
//! A 403 means the token is not eligible, a 404 that it is unknown. Both
//! surface as [`ClientError::ApiError`] with the status preserved; the
//! caller decides what they mean.

use async_trait::async_trait;
use dcc_core::TestResult;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

const TEST_RESULT_PATH: &str = "version/v1/testresult";

/// Request body for `POST /version/v1/testresult`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationTokenRequest<'a> {
    registration_token: &'a str,
}

/// Test outcome bound to a registration token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultInfo {
    /// Outcome code.
    pub test_result: TestResult,
    /// Lab that processed the test.
    #[serde(default)]
    pub lab_id: Option<String>,
    /// Pseudonymous test identifier (the hashed GUID).
    #[serde(default)]
    pub test_id: Option<String>,
    /// Sample collection time, seconds since the epoch.
    #[serde(default, rename = "sc")]
    pub sample_collection: Option<i64>,
}

/// Resolves registration tokens.
#[async_trait]
pub trait VerificationOracle: Send + Sync {
    /// Look up the test outcome for `registration_token`.
    async fn resolve(&self, registration_token: &str) -> Result<TestResultInfo, ClientError>;
}

/// HTTP client for the verification server.
#[derive(Debug, Clone)]
pub struct VerificationClient {
    http: reqwest::Client,
    base_url: url::Url,
}

impl VerificationClient {
    pub(crate) fn new(http: reqwest::Client, base_url: url::Url) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl VerificationOracle for VerificationClient {
    /// Calls `POST {base_url}/version/v1/testresult`.
    async fn resolve(&self, registration_token: &str) -> Result<TestResultInfo, ClientError> {
        let endpoint = "POST /version/v1/testresult";
        let url = crate::join_url(&self.base_url, TEST_RESULT_PATH);

        let resp = self
            .http
            .post(&url)
            .json(&RegistrationTokenRequest { registration_token })
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

        resp.json()
            .await
            .map_err(|e| ClientError::Deserialization {
                endpoint: endpoint.into(),
                source: e,
            })
    }
}
