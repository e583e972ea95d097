//! # DCC Services
//!
//! The library API of the server. Each service owns one slice of the
//! credential lifecycle and holds its collaborators as trait objects:
//!
//! - [`LifecycleManager`]: registration state machine over the
//!   [`RegistrationStore`](crate::store::RegistrationStore).
//! - [`LabClaimManager`]: exclusive, quota-limited lab claims.
//! - [`SigningOrchestrator`]: bounded-retry signing of uploaded hashes.
//! - [`RetentionSweeper`]: staged erasure of stale records under a lease.
//! - [`LabUploadService`]: the lab upload and credential download flows
//!   that combine the above.
//!
//! None of the services take in-process locks. Concurrent writers are
//! arbitrated by the store (unique constraints and record versions).

pub mod lab_claim;
pub mod lifecycle;
pub mod retention;
pub mod signing;
pub mod upload;

pub use lab_claim::{ClaimOutcome, LabClaimManager};
pub use lifecycle::{LifecycleManager, PendingPublicKey};
pub use retention::{RetentionSweeper, SweepReport};
pub use signing::SigningOrchestrator;
pub use upload::{DccClaim, DccUploadRequest, LabUploadService};

/// Shorten a registration token for log output.
pub(crate) fn token_prefix(token: &str) -> String {
    let mut prefix: String = token.chars().take(8).collect();
    if token.chars().count() > 8 {
        prefix.push_str("...");
    }
    prefix
}

/// Scripted oracles shared by the service unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, VecDeque};

    use async_trait::async_trait;
    use dcc_client::{ClientError, SigningOracle, TestResultInfo, VerificationOracle};
    use dcc_core::TestResult;
    use parking_lot::Mutex;

    pub(crate) fn api_error(status: u16) -> ClientError {
        ClientError::ApiError {
            endpoint: "scripted".into(),
            status,
            body: String::new(),
        }
    }

    /// Verification oracle answering from a fixed table. Unknown tokens
    /// answer 404.
    #[derive(Default)]
    pub(crate) struct ScriptedVerification {
        answers: Mutex<HashMap<String, Result<TestResultInfo, u16>>>,
    }

    impl ScriptedVerification {
        pub(crate) fn with_result(self, token: &str, result: TestResult, lab_id: &str, test_id: &str) -> Self {
            self.answers.lock().insert(
                token.to_string(),
                Ok(TestResultInfo {
                    test_result: result,
                    lab_id: Some(lab_id.to_string()),
                    test_id: Some(test_id.to_string()),
                    sample_collection: None,
                }),
            );
            self
        }

        pub(crate) fn with_status(self, token: &str, status: u16) -> Self {
            self.answers.lock().insert(token.to_string(), Err(status));
            self
        }
    }

    #[async_trait]
    impl VerificationOracle for ScriptedVerification {
        async fn resolve(&self, registration_token: &str) -> Result<TestResultInfo, ClientError> {
            match self.answers.lock().get(registration_token) {
                Some(Ok(info)) => Ok(info.clone()),
                Some(Err(status)) => Err(api_error(*status)),
                None => Err(api_error(404)),
            }
        }
    }

    /// Signing oracle replaying a queue of answers. An exhausted queue
    /// answers 503.
    #[derive(Default)]
    pub(crate) struct ScriptedSigning {
        answers: Mutex<VecDeque<Result<Vec<u8>, u16>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSigning {
        pub(crate) fn then_ok(self, bytes: &[u8]) -> Self {
            self.answers.lock().push_back(Ok(bytes.to_vec()));
            self
        }

        pub(crate) fn then_status(self, status: u16) -> Self {
            self.answers.lock().push_back(Err(status));
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl SigningOracle for ScriptedSigning {
        async fn sign_hash(&self, hash_b64: &str) -> Result<Vec<u8>, ClientError> {
            self.calls.lock().push(hash_b64.to_string());
            match self.answers.lock().pop_front() {
                Some(Ok(bytes)) => Ok(bytes),
                Some(Err(status)) => Err(api_error(status)),
                None => Err(api_error(503)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::token_prefix;

    #[test]
    fn token_prefix_truncates_long_tokens() {
        assert_eq!(token_prefix("0123456789abcdef"), "01234567...");
        assert_eq!(token_prefix("short"), "short");
    }
}
