//! # Service Metrics
//!
//! Counters are emitted through the `metrics` facade. Without an installed
//! recorder they are no-ops, so library users and tests pay nothing. The
//! binary installs the Prometheus recorder via [`install_recorder`] and
//! serves its rendering on `/metrics`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Registrations persisted by `create_registration`.
pub const REGISTRATIONS_CREATED: &str = "dcc_registrations_created_total";
/// Signing oracle calls, labelled by `outcome`.
pub const SIGN_ATTEMPTS: &str = "dcc_sign_attempts_total";
/// Lab claim decisions, labelled by `result`.
pub const LAB_CLAIMS: &str = "dcc_lab_claims_total";
/// Rows touched by the retention sweeper, labelled by `stage`.
pub const SWEEPER_ROWS: &str = "dcc_sweeper_rows_total";

/// Install the global Prometheus recorder.
///
/// Fails if a recorder is already installed for this process.
pub fn install_recorder() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub(crate) fn registration_created() {
    metrics::counter!(REGISTRATIONS_CREATED).increment(1);
}

pub(crate) fn sign_attempt(outcome: &'static str) {
    metrics::counter!(SIGN_ATTEMPTS, "outcome" => outcome).increment(1);
}

pub(crate) fn lab_claim(result: &'static str) {
    metrics::counter!(LAB_CLAIMS, "result" => result).increment(1);
}

pub(crate) fn sweeper_rows(stage: &'static str, rows: u64) {
    if rows > 0 {
        metrics::counter!(SWEEPER_ROWS, "stage" => stage).increment(rows);
    }
}
