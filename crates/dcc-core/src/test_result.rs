//! Test outcome codes reported by the verification server.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Outcome of a laboratory or rapid test, as an integer code on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum TestResult {
    /// PCR result not yet available.
    Pending = 0,
    /// PCR negative.
    Negative = 1,
    /// PCR positive.
    Positive = 2,
    /// PCR sample could not be evaluated.
    Invalid = 3,
    /// PCR result already redeemed.
    Redeemed = 4,
    /// Rapid test result not yet available.
    QuickPending = 5,
    /// Rapid test negative.
    QuickNegative = 6,
    /// Rapid test positive.
    QuickPositive = 7,
    /// Rapid test could not be evaluated.
    QuickInvalid = 8,
    /// Rapid test result already redeemed.
    QuickRedeemed = 9,
}

impl TestResult {
    /// Whether the outcome is still open. A credential cannot be issued
    /// for a pending result.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending | Self::QuickPending)
    }
}

impl TryFrom<u8> for TestResult {
    type Error = ValidationError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Pending,
            1 => Self::Negative,
            2 => Self::Positive,
            3 => Self::Invalid,
            4 => Self::Redeemed,
            5 => Self::QuickPending,
            6 => Self::QuickNegative,
            7 => Self::QuickPositive,
            8 => Self::QuickInvalid,
            9 => Self::QuickRedeemed,
            other => return Err(ValidationError::UnknownTestResult(other)),
        })
    }
}

impl From<TestResult> for u8 {
    fn from(r: TestResult) -> Self {
        r as u8
    }
}
