//! End-to-end tests for status list allocation, mutation and serving.

mod utils;

use openbadges_vc::bitstring::StatusSize;
use openbadges_vc::codec;
use openbadges_vc::endpoint;
use openbadges_vc::handlers::{
    CreateListRequest, ListListsRequest, StatusListCredentialRequest, StatusListStats,
    StatusListStatsRequest, UpdateCredentialStatusResponse, UpdateStatusRequest,
};
use openbadges_vc::status::{AssignStatusRequest, StatusList, StatusPurpose};

const ISSUER: &str = "https://issuer.example.org";

// A fresh 1-bit list decodes to 16384 zero bytes behind a `u`-prefixed
// encoding.
#[tokio::test]
async fn empty_bitstring_shape() {
    utils::init_tracer();
    let (service, config) = utils::service().await;

    let request = CreateListRequest {
        issuer_id: ISSUER.to_string(),
        purpose: StatusPurpose::Revocation,
        status_size: None,
        total_entries: None,
        ttl: None,
    };
    let list: StatusList = endpoint::handle(request, &service).await.expect("list created");

    assert_eq!(list.total_entries, 131_072);
    assert_eq!(list.used_entries, 0);
    assert!(list.encoded_list.starts_with('u'));

    let decoded = codec::decode(&list.encoded_list).expect("decodes");
    assert_eq!(decoded.len(), 16384);
    assert!(decoded.iter().all(|b| *b == 0));

    utils::cleanup(&config).await;
}

// Allocating index 0 and revoking flips byte 0 to 0x80, and verification
// reports the assertion revoked.
#[tokio::test]
async fn single_bit_revocation_round_trip() {
    utils::init_tracer();
    let (service, config) = utils::service().await;

    let wire = service
        .status_engine
        .assign_credential_status(&AssignStatusRequest {
            credential_id: "cred-A".to_string(),
            issuer_id: ISSUER.to_string(),
            ..AssignStatusRequest::default()
        })
        .await
        .expect("assigned");
    assert_eq!(wire.status_list_index, "0");

    let response: UpdateCredentialStatusResponse = endpoint::handle(
        UpdateStatusRequest {
            credential_id: "cred-A".to_string(),
            status: 1,
            reason: Some("terms violation".to_string()),
            purpose: StatusPurpose::Revocation,
        },
        &service,
    )
    .await
    .expect("status updated");
    assert!(response.success);
    assert_eq!(response.new_status, 1);

    let list_id = wire.status_list_credential.rsplit('/').next().expect("list id");
    let list = service.status_engine.get_status_list(list_id).await.expect("list");
    let decoded = codec::decode(&list.encoded_list).expect("decodes");
    assert_eq!(decoded[0], 0x80);

    utils::cleanup(&config).await;
}

// statusSize=2: writing 3 at index 3 (bit offset 6) lands in the low two
// bits of byte 0.
#[tokio::test]
async fn multi_bit_tail_write() {
    utils::init_tracer();
    let (service, config) = utils::service().await;

    for i in 0..4 {
        service
            .status_engine
            .assign_credential_status(&AssignStatusRequest {
                credential_id: format!("cred-{i}"),
                issuer_id: ISSUER.to_string(),
                purpose: StatusPurpose::Message,
                status_size: StatusSize::Two,
                ..AssignStatusRequest::default()
            })
            .await
            .expect("assigned");
    }

    let entry = service
        .status_engine
        .update_credential_status(&UpdateStatusRequest {
            credential_id: "cred-3".to_string(),
            status: 3,
            reason: None,
            purpose: StatusPurpose::Message,
        })
        .await
        .expect("updated");
    assert_eq!(entry.status_list_index, 3);

    let value = service
        .status_engine
        .credential_status_value("cred-3", StatusPurpose::Message)
        .await
        .expect("read back");
    assert_eq!(value, 3);

    let list = service.status_engine.get_status_list(&entry.status_list_id).await.expect("list");
    let decoded = codec::decode(&list.encoded_list).expect("decodes");
    assert_eq!(decoded[0], 0x03);

    utils::cleanup(&config).await;
}

// GET /v3/status-lists/:id returns a signed BitstringStatusListCredential
// wrapping the list's encoded bitstring.
#[tokio::test]
async fn status_list_credential_materialization() {
    utils::init_tracer();
    let (service, config) = utils::service().await;

    let list = service
        .status_engine
        .find_or_create_status_list(ISSUER, StatusPurpose::Revocation, StatusSize::One)
        .await
        .expect("list");

    let response: openbadges_vc::handlers::StatusListCredentialResponse = endpoint::handle(
        StatusListCredentialRequest {
            list_id: list.id.clone(),
        },
        &service,
    )
    .await
    .expect("credential served");

    let credential = serde_json::to_value(&response.credential).expect("serializes");
    assert!(
        credential["type"]
            .as_array()
            .expect("type array")
            .iter()
            .any(|t| t == "BitstringStatusListCredential")
    );
    assert_eq!(credential["credentialSubject"]["type"], "BitstringStatusList");
    assert_eq!(credential["credentialSubject"]["encodedList"], list.encoded_list.as_str());
    assert_eq!(credential["issuer"], ISSUER);
    assert!(credential["proof"]["proofValue"].is_string());

    assert!(response.etag.starts_with('"') && response.etag.ends_with('"'));
    assert_eq!(response.max_age_secs, 300);

    utils::cleanup(&config).await;
}

// Unknown list ids surface as 404s.
#[tokio::test]
async fn unknown_list_not_found() {
    utils::init_tracer();
    let (service, config) = utils::service().await;

    let result: endpoint::Result<StatusListStats> = endpoint::handle(
        StatusListStatsRequest {
            list_id: "no-such-list".to_string(),
        },
        &service,
    )
    .await;
    let err = result.expect_err("missing list");
    assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);

    utils::cleanup(&config).await;
}

// Listing supports the capacity filter, and stats reflect allocation.
#[tokio::test]
async fn listing_and_stats() {
    utils::init_tracer();
    let (service, config) = utils::service().await;

    let list = service
        .status_engine
        .find_or_create_status_list(ISSUER, StatusPurpose::Suspension, StatusSize::One)
        .await
        .expect("list");
    service
        .status_engine
        .assign_credential_status(&AssignStatusRequest {
            credential_id: "cred-A".to_string(),
            issuer_id: ISSUER.to_string(),
            purpose: StatusPurpose::Suspension,
            ..AssignStatusRequest::default()
        })
        .await
        .expect("assigned");

    let lists: Vec<StatusList> = endpoint::handle(
        ListListsRequest {
            issuer_id: Some(ISSUER.to_string()),
            purpose: Some(StatusPurpose::Suspension),
            has_capacity: Some(true),
        },
        &service,
    )
    .await
    .expect("listed");
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].id, list.id);
    assert_eq!(lists[0].used_entries, 1);

    let stats: StatusListStats =
        endpoint::handle(StatusListStatsRequest { list_id: list.id }, &service)
            .await
            .expect("stats");
    assert_eq!(stats.total_entries, 131_072);
    assert_eq!(stats.used_entries, 1);
    assert_eq!(stats.available_entries, 131_071);
    assert!(stats.utilization_percent > 0.0 && stats.utilization_percent < 0.01);

    utils::cleanup(&config).await;
}

// totalEntries below the privacy floor is rejected with a 400.
#[tokio::test]
async fn short_list_rejected() {
    utils::init_tracer();
    let (service, config) = utils::service().await;

    let result: endpoint::Result<StatusList> = endpoint::handle(
        CreateListRequest {
            issuer_id: ISSUER.to_string(),
            purpose: StatusPurpose::Revocation,
            status_size: None,
            total_entries: Some(1024),
            ttl: None,
        },
        &service,
    )
    .await;
    let err = result.expect_err("below the floor");
    assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);

    // as is a status size outside {1, 2, 4, 8}
    let result: endpoint::Result<StatusList> = endpoint::handle(
        CreateListRequest {
            issuer_id: ISSUER.to_string(),
            purpose: StatusPurpose::Revocation,
            status_size: Some(3),
            total_entries: None,
            ttl: None,
        },
        &service,
    )
    .await;
    let err = result.expect_err("invalid size");
    assert_eq!(err.status_code(), http::StatusCode::BAD_REQUEST);

    utils::cleanup(&config).await;
}
