//! Oracle client configuration.
//!
//! Base URLs for the verification server and the signing service. Both are
//! required in production; tests build a config pointing at mock servers.

use url::Url;
use zeroize::Zeroizing;

/// Default request timeout applied to both oracles.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for connecting to the verification server and the signing
/// service.
///
/// Custom `Debug` implementation redacts the `signing_api_key` field
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct OracleConfig {
    /// Base URL of the verification server.
    pub verification_server_url: Url,
    /// Base URL of the signing service.
    pub signing_api_url: Url,
    /// Bearer token for the signing service, if it requires one.
    pub signing_api_key: Option<Zeroizing<String>>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl std::fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleConfig")
            .field("verification_server_url", &self.verification_server_url)
            .field("signing_api_url", &self.signing_api_url)
            .field(
                "signing_api_key",
                &self.signing_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl OracleConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `VERIFICATION_SERVER_URL` (required)
    /// - `SIGNING_API_URL` (required)
    /// - `SIGNING_API_KEY` (optional)
    /// - `ORACLE_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            verification_server_url: required_url("VERIFICATION_SERVER_URL")?,
            signing_api_url: required_url("SIGNING_API_URL")?,
            signing_api_key: std::env::var("SIGNING_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(Zeroizing::new),
            timeout_secs: std::env::var("ORACLE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Create a configuration pointing both oracles at local mock servers.
    pub fn local_mock(verification_url: &str, signing_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            verification_server_url: parse_url("verification_url", verification_url)?,
            signing_api_url: parse_url("signing_url", signing_url)?,
            signing_api_key: None,
            timeout_secs: 5,
        })
    }
}

fn required_url(var: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).map_err(|_| ConfigError::Missing(var.to_string()))?;
    parse_url(var, &raw)
}

fn parse_url(name: &str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(name.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(String),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}
