//! # End-to-end credential flows
//!
//! Registration, lab claim, upload, signing and download against in-memory
//! stores and scripted oracles.

mod common;

use common::{guid, signed_placeholder, Harness, DCC_HASH, PARTNER, PUBLIC_KEY};
use dcc_api::config::DccConfig;
use dcc_api::error::DccError;
use dcc_api::services::{ClaimOutcome, DccClaim, DccUploadRequest};
use dcc_api::store::RegistrationStore;
use dcc_core::{DccErrorReason, NewRegistration, RegistrationState, TestResult};
use dcc_crypto::{decode_base64, encode_base64, parse_sign1};

fn upload_request() -> DccUploadRequest {
    DccUploadRequest {
        dcc_hash: DCC_HASH.to_string(),
        encrypted_dcc: encode_base64(b"encrypted payload"),
        data_encryption_key: encode_base64(b"wrapped key"),
    }
}

// -- Registration -------------------------------------------------------------

#[tokio::test]
async fn full_lifecycle_signs_on_first_attempt() {
    let h = Harness::with_quota(2);
    h.verification.answer("T", TestResult::Negative, "L", "ID123");
    let signed_bytes = signed_placeholder();
    h.signing.push_ok(signed_bytes.clone());

    let record = h.state.lifecycle.create_registration("T", PUBLIC_KEY).await.unwrap();
    assert_eq!(record.lab_id.as_deref(), Some("L"));
    assert_eq!(record.hashed_guid.as_deref(), Some("ID123"));
    assert!(record.dcci.is_some());
    assert!(record.dcc.is_none());

    assert_eq!(
        h.state.claims.get_or_create_claim("P", "L").await.unwrap(),
        ClaimOutcome::Granted
    );
    assert_eq!(h.state.claims.remaining_quota("P").await.unwrap(), 1);

    let record = h
        .state
        .lifecycle
        .update_registration(
            record,
            Some(DCC_HASH.into()),
            Some("RQ==".into()),
            Some("Sw==".into()),
            Some("P".into()),
        )
        .await
        .unwrap();
    assert_eq!(record.dcc_hash.as_deref(), Some(DCC_HASH));

    let signed = h.state.signing.sign(record).await.unwrap();
    assert_eq!(signed.dcc.as_deref(), Some(encode_base64(&signed_bytes).as_str()));
    assert!(signed.error.is_none());
    assert_eq!(signed.state(), RegistrationState::Signed);
    assert_eq!(h.signing.calls(), 1);
}

#[tokio::test]
async fn duplicate_token_persists_nothing_new() {
    let h = Harness::with_quota(2);
    h.verification.answer("T", TestResult::Positive, "L", &guid(1));

    h.state.lifecycle.create_registration("T", PUBLIC_KEY).await.unwrap();
    let err = h
        .state
        .lifecycle
        .create_registration("T", PUBLIC_KEY)
        .await
        .unwrap_err();
    assert!(matches!(err, DccError::DuplicateRegistrationToken));
    assert_eq!(h.registrations.len(), 1);
}

#[tokio::test]
async fn pending_results_are_forbidden() {
    let h = Harness::with_quota(2);
    h.verification.answer("pcr", TestResult::Pending, "L", &guid(1));
    h.verification.answer("quick", TestResult::QuickPending, "L", &guid(2));
    h.verification.fail("refused", 403);

    for token in ["pcr", "quick", "refused"] {
        assert!(matches!(
            h.state.lifecycle.create_registration(token, PUBLIC_KEY).await,
            Err(DccError::ForbiddenToken)
        ));
    }
    assert!(h.registrations.is_empty());
}

#[tokio::test]
async fn unknown_token_and_oracle_outage() {
    let h = Harness::with_quota(2);
    h.verification.fail("down", 503);

    assert!(matches!(
        h.state.lifecycle.create_registration("missing", PUBLIC_KEY).await,
        Err(DccError::TokenNotFound)
    ));
    assert!(matches!(
        h.state.lifecycle.create_registration("down", PUBLIC_KEY).await,
        Err(DccError::OracleUnavailable(_))
    ));
    assert!(h.registrations.is_empty());
}

// -- Upload and signing -------------------------------------------------------

#[tokio::test]
async fn upload_signs_and_download_splices_payload() {
    let h = Harness::with_quota(2);
    h.verification.answer("T", TestResult::Negative, "L", &guid(1));
    h.signing.push_ok(signed_placeholder());

    h.state.lifecycle.create_registration("T", PUBLIC_KEY).await.unwrap();
    assert_eq!(h.state.uploads.claim_dcc("T").await.unwrap(), DccClaim::Pending);

    let dcc = h
        .state
        .uploads
        .upload_dcc(&guid(1), PARTNER, upload_request())
        .await
        .unwrap();
    assert_eq!(decode_base64(&dcc).unwrap(), signed_placeholder());

    match h.state.uploads.claim_dcc("T").await.unwrap() {
        DccClaim::Ready {
            data_encryption_key,
            dcc,
        } => {
            assert_eq!(data_encryption_key, Some(encode_base64(b"wrapped key")));
            let bytes = decode_base64(&dcc).unwrap();
            let placeholder = signed_placeholder();
            let original = parse_sign1(&placeholder).unwrap();
            let spliced = parse_sign1(&bytes).unwrap();
            assert_eq!(spliced.element(0), original.element(0));
            assert_eq!(spliced.element(1), original.element(1));
            assert_eq!(spliced.element(3), original.element(3));
            assert_ne!(spliced.element(2), original.element(2));
        }
        other => panic!("expected Ready, got {other:?}"),
    }
}

#[tokio::test]
async fn second_upload_is_conflict() {
    let h = Harness::with_quota(2);
    h.verification.answer("T", TestResult::Negative, "L", &guid(1));
    h.signing.push_ok(signed_placeholder());
    h.state.lifecycle.create_registration("T", PUBLIC_KEY).await.unwrap();

    h.state
        .uploads
        .upload_dcc(&guid(1), PARTNER, upload_request())
        .await
        .unwrap();
    assert!(matches!(
        h.state.uploads.upload_dcc(&guid(1), PARTNER, upload_request()).await,
        Err(DccError::Conflict(_))
    ));
}

#[tokio::test]
async fn signing_fails_twice_leaves_record_failed() {
    let h = Harness::with_quota(2);
    h.verification.answer("T", TestResult::Negative, "L", &guid(1));
    h.signing.push_status(500);
    h.signing.push_status(500);
    h.state.lifecycle.create_registration("T", PUBLIC_KEY).await.unwrap();

    let err = h
        .state
        .uploads
        .upload_dcc(&guid(1), PARTNER, upload_request())
        .await
        .unwrap_err();
    assert!(matches!(err, DccError::SigningServerError));
    assert_eq!(err.reason(), Some(DccErrorReason::SigningServerError));
    assert_eq!(h.signing.calls(), 2);

    let record = h.state.lifecycle.find_by_hashed_guid(&guid(1)).await.unwrap().unwrap();
    assert_eq!(record.state(), RegistrationState::Failed);
    assert!(record.dcc.is_none());
    assert!(record.dcc_hash.is_none());
    assert!(record.dcc_encrypted_payload.is_none());
    assert!(record.encrypted_data_encryption_key.is_none());

    // Nothing to download yet.
    assert_eq!(h.state.uploads.claim_dcc("T").await.unwrap(), DccClaim::Pending);
}

#[tokio::test]
async fn failed_record_accepts_reupload() {
    let h = Harness::with_quota(2);
    h.verification.answer("T", TestResult::Negative, "L", &guid(1));
    h.signing.push_status(400);
    h.signing.push_status(400);
    h.signing.push_ok(signed_placeholder());
    h.state.lifecycle.create_registration("T", PUBLIC_KEY).await.unwrap();

    assert!(matches!(
        h.state.uploads.upload_dcc(&guid(1), PARTNER, upload_request()).await,
        Err(DccError::SigningClientError)
    ));
    h.state
        .uploads
        .upload_dcc(&guid(1), PARTNER, upload_request())
        .await
        .unwrap();

    let record = h.state.lifecycle.find_by_hashed_guid(&guid(1)).await.unwrap().unwrap();
    assert_eq!(record.state(), RegistrationState::Signed);
    assert!(record.error.is_none());
}

#[tokio::test]
async fn signing_fails_once_then_succeeds() {
    let h = Harness::with_quota(2);
    h.verification.answer("T", TestResult::Negative, "L", &guid(1));
    h.signing.push_status(503);
    h.signing.push_ok(signed_placeholder());
    h.state.lifecycle.create_registration("T", PUBLIC_KEY).await.unwrap();

    h.state
        .uploads
        .upload_dcc(&guid(1), PARTNER, upload_request())
        .await
        .unwrap();
    let record = h.state.lifecycle.find_by_hashed_guid(&guid(1)).await.unwrap().unwrap();
    assert_eq!(record.state(), RegistrationState::Signed);
    assert!(record.error.is_none());
    assert_eq!(h.signing.calls(), 2);
}

#[tokio::test]
async fn invalid_base64_marks_lab_invalid_response() {
    let h = Harness::with_quota(2);
    h.verification.answer("T", TestResult::Negative, "L", &guid(1));
    h.state.lifecycle.create_registration("T", PUBLIC_KEY).await.unwrap();

    let mut request = upload_request();
    request.encrypted_dcc = "%%%".into();
    assert!(matches!(
        h.state.uploads.upload_dcc(&guid(1), PARTNER, request).await,
        Err(DccError::InvalidPayloadEncoding(_))
    ));

    let record = h.state.lifecycle.find_by_hashed_guid(&guid(1)).await.unwrap().unwrap();
    assert_eq!(record.error, Some(DccErrorReason::LabInvalidResponse));
    assert_eq!(h.signing.calls(), 0);
}

#[tokio::test]
async fn malformed_upload_fields_are_rejected_up_front() {
    let h = Harness::with_quota(2);

    let mut bad_hash = upload_request();
    bad_hash.dcc_hash = "abc".into();
    assert!(matches!(
        h.state.uploads.upload_dcc(&guid(1), PARTNER, bad_hash).await,
        Err(DccError::InvalidPayloadEncoding(_))
    ));

    assert!(matches!(
        h.state.uploads.upload_dcc(&guid(1), "not-alnum", upload_request()).await,
        Err(DccError::InvalidPayloadEncoding(_))
    ));

    let mut long_dcc = upload_request();
    long_dcc.encrypted_dcc = "A".repeat(1004);
    assert!(matches!(
        h.state.uploads.upload_dcc(&guid(1), PARTNER, long_dcc).await,
        Err(DccError::InvalidPayloadEncoding(_))
    ));

    assert!(matches!(
        h.state.uploads.upload_dcc(&guid(9), PARTNER, upload_request()).await,
        Err(DccError::NotFound(_))
    ));
}

// -- Lab claims ---------------------------------------------------------------

#[tokio::test]
async fn upload_for_lab_held_by_other_partner_is_claim_conflict() {
    let h = Harness::with_quota(2);
    h.verification.answer("T", TestResult::Negative, "L", &guid(1));
    h.state.lifecycle.create_registration("T", PUBLIC_KEY).await.unwrap();
    h.state.claims.get_or_create_claim("A", "L").await.unwrap();

    let err = h
        .state
        .uploads
        .upload_dcc(&guid(1), "B", upload_request())
        .await
        .unwrap_err();
    assert!(matches!(err, DccError::ClaimConflict { ref lab_id } if lab_id == "L"));
    assert_eq!(h.state.claims.get_claim("L").await.unwrap().unwrap().partner_id, "A");
}

#[tokio::test]
async fn upload_beyond_quota_is_quota_exceeded() {
    let h = Harness::with_quota(1);
    h.verification.answer("T", TestResult::Negative, "L2", &guid(1));
    h.state.lifecycle.create_registration("T", PUBLIC_KEY).await.unwrap();
    h.state.claims.get_or_create_claim(PARTNER, "L1").await.unwrap();

    assert!(matches!(
        h.state.uploads.upload_dcc(&guid(1), PARTNER, upload_request()).await,
        Err(DccError::QuotaExceeded { quota: 1, .. })
    ));
}

#[tokio::test]
async fn upload_without_lab_is_not_found_and_claims_nothing() {
    let h = Harness::new(DccConfig::default());
    h.registrations
        .insert(NewRegistration {
            registration_token: "T".into(),
            public_key: PUBLIC_KEY.into(),
            hashed_guid: Some(guid(1)),
            lab_id: None,
            dcci: "URN:UVCI:V1:DE:X".into(),
        })
        .await
        .unwrap();

    assert!(matches!(
        h.state.uploads.upload_dcc(&guid(1), PARTNER, upload_request()).await,
        Err(DccError::NotFound(_))
    ));
    assert!(h.claims.is_empty());
    assert_eq!(h.state.claims.remaining_quota(PARTNER).await.unwrap(), 100);
    assert_eq!(h.signing.calls(), 0);
}

#[tokio::test]
async fn claim_scenario_from_two_partners() {
    let h = Harness::with_quota(2);
    let claims = &h.state.claims;

    assert_eq!(claims.get_or_create_claim("A", "L1").await.unwrap(), ClaimOutcome::Granted);
    assert_eq!(claims.remaining_quota("A").await.unwrap(), 1);

    assert_eq!(claims.get_or_create_claim("B", "L1").await.unwrap(), ClaimOutcome::Conflict);
    assert_eq!(claims.get_claim("L1").await.unwrap().unwrap().partner_id, "A");

    let before = claims.get_claim("L1").await.unwrap().unwrap().last_used;
    assert_eq!(claims.get_or_create_claim("A", "L1").await.unwrap(), ClaimOutcome::Granted);
    assert!(claims.get_claim("L1").await.unwrap().unwrap().last_used >= before);

    assert_eq!(claims.get_or_create_claim("A", "L2").await.unwrap(), ClaimOutcome::Granted);
    assert_eq!(
        claims.get_or_create_claim("A", "L3").await.unwrap(),
        ClaimOutcome::QuotaExceeded
    );
    assert_eq!(h.claims.len(), 2);
}

// -- Download -----------------------------------------------------------------

#[tokio::test]
async fn download_unknown_token_is_not_found() {
    let h = Harness::with_quota(2);
    assert!(matches!(
        h.state.uploads.claim_dcc("nope").await,
        Err(DccError::NotFound(_))
    ));
}

#[tokio::test]
async fn download_after_dcc_cleanup_is_gone() {
    let h = Harness::with_quota(2);
    h.verification.answer("T", TestResult::Negative, "L", &guid(1));
    let record = h.state.lifecycle.create_registration("T", PUBLIC_KEY).await.unwrap();
    h.state
        .lifecycle
        .update_registration(record, None, None, Some("a2V5".into()), Some(PARTNER.into()))
        .await
        .unwrap();

    assert!(matches!(h.state.uploads.claim_dcc("T").await, Err(DccError::Gone(_))));
}
