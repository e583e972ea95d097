//! # dcc-client -- Typed Rust clients for the DCC oracles
//!
//! Two external authorities sit behind this crate:
//! - **Verification server**: resolves a registration token to its test
//!   outcome, lab and hashed GUID.
//! - **Signing service**: turns a base64 payload hash into a signed
//!   COSE_Sign1 object.
//!
//! ## Architecture
//!
//! Each oracle is a trait ([`VerificationOracle`], [`SigningOracle`]) with an
//! HTTP implementation. Services in `dcc-api` depend on the traits so they can
//! be driven by scripted oracles in tests. [`retry::retry_bounded`] is the
//! attempt-capped wrapper the signing orchestrator puts around its call; the
//! HTTP clients themselves never retry.

pub mod config;
pub mod error;
pub mod retry;
pub mod signing;
pub mod verification;

pub use config::{ConfigError, OracleConfig};
pub use error::ClientError;
pub use retry::retry_bounded;
pub use signing::{SigningClient, SigningOracle};
pub use verification::{TestResultInfo, VerificationClient, VerificationOracle};

use std::time::Duration;

/// Holds the HTTP clients for both oracles, sharing one connection pool.
#[derive(Debug, Clone)]
pub struct OracleClients {
    verification: VerificationClient,
    signing: SigningClient,
}

impl OracleClients {
    /// Create both clients from configuration.
    pub fn new(config: OracleConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;

        // The signing key applies to the signing service only.
        let signing_http = match &config.signing_api_key {
            Some(key) => reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .default_headers({
                    let mut headers = reqwest::header::HeaderMap::new();
                    let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", key.as_str()))
                        .map_err(|_| ClientError::Config(ConfigError::Missing("SIGNING_API_KEY".into())))?;
                    value.set_sensitive(true);
                    headers.insert(reqwest::header::AUTHORIZATION, value);
                    headers
                })
                .build()
                .map_err(|e| ClientError::Http {
                    endpoint: "client_init".into(),
                    source: e,
                })?,
            None => http.clone(),
        };

        Ok(Self {
            verification: VerificationClient::new(http, config.verification_server_url),
            signing: SigningClient::new(signing_http, config.signing_api_url),
        })
    }

    /// Access the verification server client.
    pub fn verification(&self) -> &VerificationClient {
        &self.verification
    }

    /// Access the signing service client.
    pub fn signing(&self) -> &SigningClient {
        &self.signing
    }
}

/// Append `path` to `base`, tolerating a base URL with or without a trailing
/// slash.
pub(crate) fn join_url(base: &url::Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}
