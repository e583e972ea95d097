//! Contract tests for VerificationClient.
//!
//! ## Endpoints Tested
//!
//! | Method | Path | Test |
//! |--------|------|------|
//! | POST   | `/version/v1/testresult` | `resolve_*` |

use dcc_client::{ClientError, OracleClients, OracleConfig, VerificationOracle};
use dcc_core::TestResult;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_clients(mock_server: &MockServer) -> OracleClients {
    let config = OracleConfig::local_mock(&mock_server.uri(), "http://127.0.0.1:19001").unwrap();
    OracleClients::new(config).unwrap()
}

#[tokio::test]
async fn resolve_sends_token_and_parses_result() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/version/v1/testresult"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({ "registrationToken": "T-0001" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "testResult": 6,
            "labId": "L",
            "testId": "ID123",
            "sc": 1700000000
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let clients = test_clients(&mock_server);
    let info = clients.verification().resolve("T-0001").await.unwrap();
    assert_eq!(info.test_result, TestResult::QuickNegative);
    assert_eq!(info.lab_id.as_deref(), Some("L"));
    assert_eq!(info.test_id.as_deref(), Some("ID123"));
    assert_eq!(info.sample_collection, Some(1_700_000_000));
}

#[tokio::test]
async fn resolve_preserves_forbidden_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/version/v1/testresult"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let clients = test_clients(&mock_server);
    let err = clients.verification().resolve("T-0002").await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert!(matches!(err, ClientError::ApiError { status: 403, .. }));
}

#[tokio::test]
async fn resolve_preserves_not_found_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/version/v1/testresult"))
        .respond_with(ResponseTemplate::new(404).set_body_string("unknown token"))
        .mount(&mock_server)
        .await;

    let clients = test_clients(&mock_server);
    match clients.verification().resolve("T-0003").await {
        Err(ClientError::ApiError { status, body, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(body, "unknown token");
        }
        other => panic!("expected ApiError, got {other:?}"),
    }
}

#[tokio::test]
async fn resolve_reports_unknown_result_code_as_deserialization_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/version/v1/testresult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "testResult": 12
        })))
        .mount(&mock_server)
        .await;

    let clients = test_clients(&mock_server);
    let err = clients.verification().resolve("T-0004").await.unwrap_err();
    assert!(matches!(err, ClientError::Deserialization { .. }));
}

#[tokio::test]
async fn resolve_does_not_retry_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/version/v1/testresult"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let clients = test_clients(&mock_server);
    let err = clients.verification().resolve("T-0005").await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(!err.is_client_error());
}
