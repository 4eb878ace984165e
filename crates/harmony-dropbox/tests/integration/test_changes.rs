//! Integration tests for remote change enumeration
//!
//! Verifies listing against a wiremock-based Dropbox mock server:
//! - Full listing with the template filter
//! - Pagination unions pages and checkpoints at the final cursor
//! - Incremental listing from a saved change token
//! - Undecodable change tokens
//! - Failures part-way through pagination
//! - Misbehaving servers that never finish paginating

use std::collections::HashSet;

use harmony_core::config::ConfigBuilder;
use harmony_core::domain::{ChangeToken, MetadataKey, RecordStatus, RemoteRecord, ServiceError};
use harmony_core::ports::ISyncService;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn page(entries: Vec<Value>, cursor: &str, has_more: bool) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "entries": entries,
        "cursor": cursor,
        "has_more": has_more
    }))
}

fn game(name: &str, rev: &str) -> Value {
    common::file_entry(
        name,
        rev,
        &[
            (MetadataKey::RecordedObjectType, "Game"),
            (MetadataKey::RecordedObjectIdentifier, name),
        ],
    )
}

async fn mount_list_folder(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_continue(server: &MockServer, cursor: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .and(body_partial_json(json!({"cursor": cursor})))
        .respond_with(response)
        .mount(server)
        .await;
}

fn identifiers(records: &HashSet<RemoteRecord>) -> HashSet<String> {
    records.iter().map(|r| r.identifier().to_string()).collect()
}

#[tokio::test]
async fn test_full_listing_returns_records_and_token() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .and(body_partial_json(json!({
            "path": "/Harmony",
            "include_deleted": true,
            "include_property_groups": {
                ".tag": "filter_some",
                "filter_some": [common::TEMPLATE_ID]
            }
        })))
        .respond_with(page(
            vec![
                game("Game-1", "a1"),
                json!({".tag": "folder", "name": "Nested", "path_lower": "/harmony/nested", "id": "id:n"}),
            ],
            "cursor-final",
            false,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let (records, token) = service.fetch_all_remote_records().await.unwrap();

    assert_eq!(records.len(), 1);
    let record = records.iter().next().unwrap();
    assert_eq!(record.identifier(), "/harmony/game-1");
    assert_eq!(record.version().identifier, "a1");
    assert_eq!(record.status(), RecordStatus::Normal);
    assert_eq!(
        record.metadata().get(MetadataKey::RecordedObjectIdentifier),
        Some("Game-1")
    );
    assert_eq!(token.as_bytes(), b"cursor-final");
}

#[tokio::test]
async fn test_pagination_unions_pages() {
    // Same content, once split across two pages and once on a single page.
    let paged = MockServer::start().await;
    let paged_service = common::authenticated_service(&paged).await;
    mount_list_folder(
        &paged,
        page(vec![game("Game-1", "a1"), game("Game-2", "b1")], "cursor-1", true),
    )
    .await;
    mount_continue(
        &paged,
        "cursor-1",
        page(
            vec![game("Game-3", "c1"), common::deleted_entry("Game-4")],
            "cursor-2",
            false,
        ),
    )
    .await;

    let single = MockServer::start().await;
    let single_service = common::authenticated_service(&single).await;
    mount_list_folder(
        &single,
        page(
            vec![
                game("Game-1", "a1"),
                game("Game-2", "b1"),
                game("Game-3", "c1"),
                common::deleted_entry("Game-4"),
            ],
            "cursor-2",
            false,
        ),
    )
    .await;

    let paged_changes = paged_service.fetch_changes(None).await.unwrap();
    let single_changes = single_service.fetch_changes(None).await.unwrap();

    assert_eq!(paged_changes.updated, single_changes.updated);
    assert_eq!(paged_changes.deleted, single_changes.deleted);
    assert_eq!(
        identifiers(&paged_changes.updated),
        HashSet::from([
            "/harmony/game-1".to_string(),
            "/harmony/game-2".to_string(),
            "/harmony/game-3".to_string(),
        ])
    );
    assert_eq!(
        paged_changes.deleted,
        HashSet::from(["/harmony/game-4".to_string()])
    );
    // The checkpoint is the final page's cursor.
    assert_eq!(paged_changes.change_token.as_bytes(), b"cursor-2");
}

#[tokio::test]
async fn test_incremental_listing_resumes_from_token() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    mount_continue(
        &server,
        "saved-cursor",
        page(
            vec![game("Game-7", "f2"), common::deleted_entry("Game-8")],
            "next-cursor",
            false,
        ),
    )
    .await;

    let token = ChangeToken::from(b"saved-cursor".to_vec());
    let changes = service.fetch_changed_remote_records(&token).await.unwrap();

    assert_eq!(changes.updated.len(), 1);
    assert!(changes
        .updated
        .iter()
        .all(|r| r.status() == RecordStatus::Updated));
    assert!(changes.deleted.contains("/harmony/game-8"));
    assert_eq!(changes.change_token.as_bytes(), b"next-cursor");
}

#[tokio::test]
async fn test_undecodable_token_fails_without_request() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let token = ChangeToken::from(vec![0xc3, 0x28, 0xa0]);
    let result = service.fetch_changed_remote_records(&token).await;

    match result {
        Err(ServiceError::InvalidChangeToken(bytes)) => assert_eq!(bytes, vec![0xc3, 0x28, 0xa0]),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_failure_mid_pagination_returns_error() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;

    mount_list_folder(&server, page(vec![game("Game-1", "a1")], "cursor-1", true)).await;
    mount_continue(
        &server,
        "cursor-1",
        ResponseTemplate::new(500).set_body_string("Internal Server Error"),
    )
    .await;

    let result = service.fetch_changes(None).await;
    assert!(matches!(result, Err(ServiceError::ConnectionFailed(_))));
}

#[tokio::test]
async fn test_revoked_token_reports_not_authenticated() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;

    mount_list_folder(&server, common::invalid_access_token()).await;

    let result = service.fetch_all_remote_records().await;
    assert!(matches!(result, Err(ServiceError::NotAuthenticated)));
}

#[tokio::test]
async fn test_non_advancing_cursor_is_invalid_response() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;

    mount_list_folder(&server, page(vec![], "stuck", true)).await;
    mount_continue(&server, "stuck", page(vec![], "stuck", true)).await;

    let result = service.fetch_changes(None).await;
    assert!(matches!(result, Err(ServiceError::InvalidResponse)));
}

#[tokio::test]
async fn test_page_limit_is_enforced() {
    let server = MockServer::start().await;
    let config = ConfigBuilder::new()
        .dropbox_base_url(server.uri())
        .sync_max_pages(2)
        .build();
    let service = common::authenticated_service_with(&server, config).await;

    mount_list_folder(&server, page(vec![game("Game-1", "a1")], "cursor-1", true)).await;
    mount_continue(&server, "cursor-1", page(vec![], "cursor-2", true)).await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .and(body_partial_json(json!({"cursor": "cursor-2"})))
        .respond_with(page(vec![], "cursor-3", false))
        .expect(0)
        .mount(&server)
        .await;

    let result = service.fetch_changes(None).await;
    assert!(matches!(result, Err(ServiceError::InvalidResponse)));
}
