//! Oracle client error types.

/// Errors from calls to the verification server or the signing service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The oracle returned a non-2xx status.
    #[error("{endpoint} returned {status}: {body}")]
    ApiError {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Response body could not be read or deserialized.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl ClientError {
    /// HTTP status reported by the oracle, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            Self::Http { source, .. } | Self::Deserialization { source, .. } => {
                source.status().map(|s| s.as_u16())
            }
            Self::Config(_) => None,
        }
    }

    /// Whether the oracle rejected the request itself (4xx). Transport
    /// failures and 5xx answers are not client errors.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> ClientError {
        ClientError::ApiError {
            endpoint: "POST /api/certify/v2/issue/hash".into(),
            status,
            body: String::new(),
        }
    }

    #[test]
    fn four_hundreds_are_client_errors() {
        assert!(api(400).is_client_error());
        assert!(api(404).is_client_error());
        assert!(api(499).is_client_error());
    }

    #[test]
    fn five_hundreds_are_not_client_errors() {
        assert!(!api(500).is_client_error());
        assert!(!api(503).is_client_error());
        assert_eq!(api(503).status(), Some(503));
    }

    #[test]
    fn config_error_has_no_status() {
        let err = ClientError::Config(super::super::config::ConfigError::Missing("X".into()));
        assert_eq!(err.status(), None);
        assert!(!err.is_client_error());
    }
}
