//! Shared fixtures for the dcc-api integration tests: scripted oracles, a
//! wired in-memory application and a minimal signed credential.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use dcc_api::config::DccConfig;
use dcc_api::state::{AppState, Backends};
use dcc_api::store::memory::{InMemoryClaimStore, InMemoryRegistrationStore, InMemorySweepLease};
use dcc_client::{ClientError, SigningOracle, TestResultInfo, VerificationOracle};
use dcc_core::TestResult;
use parking_lot::Mutex;

pub const PUBLIC_KEY: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAE";
pub const DCC_HASH: &str = "f1e2d3c4b5a6978812345678f1e2d3c4b5a6978812345678f1e2d3c4b5a69788";
pub const PARTNER: &str = "P";

/// Hashed GUIDs in the same format the verification server returns.
pub fn guid(n: u8) -> String {
    format!("{:064x}", n)
}

fn api_error(status: u16) -> ClientError {
    ClientError::ApiError {
        endpoint: "scripted".into(),
        status,
        body: String::new(),
    }
}

/// Verification server answering from a table; unknown tokens get 404.
#[derive(Default)]
pub struct ScriptedVerification {
    answers: Mutex<HashMap<String, Result<TestResultInfo, u16>>>,
}

impl ScriptedVerification {
    pub fn answer(&self, token: &str, result: TestResult, lab_id: &str, test_id: &str) {
        self.answers.lock().insert(
            token.to_string(),
            Ok(TestResultInfo {
                test_result: result,
                lab_id: Some(lab_id.to_string()),
                test_id: Some(test_id.to_string()),
                sample_collection: Some(1_700_000_000),
            }),
        );
    }

    pub fn fail(&self, token: &str, status: u16) {
        self.answers.lock().insert(token.to_string(), Err(status));
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

/// Signing service replaying queued answers; an empty queue answers 503.
#[derive(Default)]
pub struct ScriptedSigning {
    answers: Mutex<VecDeque<Result<Vec<u8>, u16>>>,
    calls: Mutex<u32>,
}

impl ScriptedSigning {
    pub fn push_ok(&self, bytes: Vec<u8>) {
        self.answers.lock().push_back(Ok(bytes));
    }

    pub fn push_status(&self, status: u16) {
        self.answers.lock().push_back(Err(status));
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl SigningOracle for ScriptedSigning {
    async fn sign_hash(&self, _hash_b64: &str) -> Result<Vec<u8>, ClientError> {
        *self.calls.lock() += 1;
        match self.answers.lock().pop_front() {
            Some(Ok(bytes)) => Ok(bytes),
            Some(Err(status)) => Err(api_error(status)),
            None => Err(api_error(503)),
        }
    }
}

/// An in-memory application with handles on every collaborator.
pub struct Harness {
    pub state: AppState,
    pub registrations: InMemoryRegistrationStore,
    pub claims: InMemoryClaimStore,
    pub lease: InMemorySweepLease,
    pub verification: Arc<ScriptedVerification>,
    pub signing: Arc<ScriptedSigning>,
}

impl Harness {
    pub fn new(config: DccConfig) -> Self {
        let registrations = InMemoryRegistrationStore::new();
        let claims = InMemoryClaimStore::new();
        let lease = InMemorySweepLease::new();
        let verification = Arc::new(ScriptedVerification::default());
        let signing = Arc::new(ScriptedSigning::default());

        let backends = Backends {
            registrations: Arc::new(registrations.clone()),
            claims: Arc::new(claims.clone()),
            lease: Arc::new(lease.clone()),
        };
        let state = AppState::build(config, backends, verification.clone(), signing.clone())
            .expect("valid test configuration");

        Self {
            state,
            registrations,
            claims,
            lease,
            verification,
            signing,
        }
    }

    pub fn with_quota(quota: u32) -> Self {
        let mut config = DccConfig::default();
        config.lab_id_claim.claims_per_partner = quota;
        Self::new(config)
    }
}

/// A tagged COSE_Sign1 with a placeholder payload:
/// `18([h'a10126', {4: h'01'}, h'00', h'5151...'])`.
pub fn signed_placeholder() -> Vec<u8> {
    let mut out = vec![0xd2, 0x84];
    out.extend_from_slice(&[0x43, 0xa1, 0x01, 0x26]);
    out.extend_from_slice(&[0xa1, 0x04, 0x41, 0x01]);
    out.extend_from_slice(&[0x41, 0x00]);
    out.push(0x58);
    out.push(64);
    out.extend(std::iter::repeat(0x51).take(64));
    out
}
