//! # Identity Newtypes
//!
//! String identifiers that arrive from lab partners are validated once at
//! construction. Downstream code can take a [`DccHash`] or [`PartnerId`]
//! without re-checking the format.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Hex-encoded SHA-256 digest of a plaintext DCC payload (64 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DccHash(String);

impl DccHash {
    /// Validate and wrap a hex digest. Case is preserved.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s))
        } else {
            Err(ValidationError::InvalidDccHash(s))
        }
    }

    /// Access the hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DccHash {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DccHash> for String {
    fn from(h: DccHash) -> Self {
        h.0
    }
}

impl std::fmt::Display for DccHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a lab partner (1-64 ASCII alphanumeric characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartnerId(String);

impl PartnerId {
    /// Validate and wrap a partner identifier.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if (1..=64).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Ok(Self(s))
        } else {
            Err(ValidationError::InvalidPartnerId(s))
        }
    }

    /// Access the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PartnerId {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<PartnerId> for String {
    fn from(p: PartnerId) -> Self {
        p.0
    }
}

impl std::fmt::Display for PartnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
