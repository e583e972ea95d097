//! # Validation Errors
//!
//! Structured errors for domain primitive construction, built with
//! `thiserror`. Each variant carries the rejected input so operators can
//! diagnose misconfiguration without guesswork.

use thiserror::Error;

/// Validation errors for domain primitives and startup configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The configured DCCI prefix contains a character outside the checksum alphabet.
    #[error(
        "configured DCCI prefix \"{prefix}\" contains invalid character '{invalid}'; only {allowed} are supported"
    )]
    InvalidDcciPrefix {
        /// The full configured prefix.
        prefix: String,
        /// The first offending character.
        invalid: char,
        /// The accepted alphabet.
        allowed: &'static str,
    },

    /// A character cannot be mapped onto the checksum alphabet.
    #[error("unsupported character for checksum: '{0}'")]
    UnsupportedChecksumCharacter(char),

    /// DCC hash is not a 64-character hex string.
    #[error("invalid DCC hash: \"{0}\" (expected 64 hex characters)")]
    InvalidDccHash(String),

    /// Partner identifier is empty, too long, or not alphanumeric.
    #[error("invalid partner ID: \"{0}\" (expected 1-64 alphanumeric characters)")]
    InvalidPartnerId(String),

    /// Verification result code outside the known range.
    #[error("unknown test result code: {0}")]
    UnknownTestResult(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_prefix_names_the_character() {
        let err = ValidationError::InvalidDcciPrefix {
            prefix: "de-x".to_string(),
            invalid: 'd',
            allowed: crate::CODE_POINTS,
        };
        let msg = err.to_string();
        assert!(msg.contains("de-x"));
        assert!(msg.contains("'d'"));
        assert!(msg.contains("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789/:"));
    }

    #[test]
    fn hash_and_partner_errors_carry_input() {
        assert!(ValidationError::InvalidDccHash("zz".into())
            .to_string()
            .contains("zz"));
        assert!(ValidationError::InvalidPartnerId("a b".into())
            .to_string()
            .contains("alphanumeric"));
    }

    #[test]
    fn unknown_test_result_display() {
        assert_eq!(
            ValidationError::UnknownTestResult(42).to_string(),
            "unknown test result code: 42"
        );
    }
}
