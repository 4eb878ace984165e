//! Integration tests for property template negotiation
//!
//! - A template is created with exactly the requested keys when none exists
//! - An existing template is extended with only the missing keys
//! - Repeated negotiation for covered keys makes no calls
//! - Concurrent negotiation creates a single template
//! - Looking up the template id never extends an existing template

use harmony_core::domain::MetadataKey;
use harmony_dropbox::schema::SchemaManager;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn manager() -> SchemaManager {
    SchemaManager::new("Harmony", "Harmony syncing metadata.")
}

async fn mount_empty_account(server: &MockServer, fields: &[MetadataKey]) {
    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/list_for_user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"template_ids": []})))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/add_for_user"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"template_id": common::TEMPLATE_ID})),
        )
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/get_for_user"))
        .and(body_partial_json(json!({"template_id": common::TEMPLATE_ID})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Harmony",
            "description": "Harmony syncing metadata.",
            "fields": common::template_fields(fields)
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_creates_template_with_requested_keys() {
    let server = MockServer::start().await;
    let requested = [MetadataKey::RecordedObjectType, MetadataKey::Sha1Hash];
    mount_empty_account(&server, &requested).await;

    let client = common::client(&server);
    let manager = manager();

    let template_id = manager.ensure(&client, requested).await.unwrap();
    assert_eq!(template_id, common::TEMPLATE_ID);

    let added = common::request_bodies(&server, "file_properties/templates/add_for_user").await;
    assert_eq!(added.len(), 1);
    assert_eq!(
        added[0],
        json!({
            "name": "Harmony",
            "description": "Harmony syncing metadata.",
            "fields": common::template_fields(&requested)
        })
    );

    // Covered keys are served from the cache; `expect(1)` above verifies it.
    let again = manager.ensure(&client, requested).await.unwrap();
    assert_eq!(again, common::TEMPLATE_ID);

    let cached = manager.cached().await.unwrap();
    assert!(cached.declares(MetadataKey::RecordedObjectType));
    assert!(cached.declares(MetadataKey::Sha1Hash));
    assert!(!cached.declares(MetadataKey::Author));
}

#[tokio::test]
async fn test_extends_existing_template_with_missing_keys_only() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/list_for_user"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"template_ids": ["ptid:existing", "ptid:other"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    // First fetch sees the original template, the re-fetch sees the grown one.
    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/get_for_user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Harmony",
            "description": "",
            "fields": common::template_fields(&[MetadataKey::Author])
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/get_for_user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Harmony",
            "description": "",
            "fields": common::template_fields(&[MetadataKey::Author, MetadataKey::IsLocked])
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/update_for_user"))
        .and(body_partial_json(json!({
            "template_id": "ptid:existing",
            "add_fields": [
                {"name": "harmony_isLocked", "description": "harmony_isLocked", "type": {".tag": "string"}}
            ]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"template_id": "ptid:existing"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/add_for_user"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = common::client(&server);
    let manager = manager();

    let template_id = manager
        .ensure(&client, [MetadataKey::Author, MetadataKey::IsLocked])
        .await
        .unwrap();
    assert_eq!(template_id, "ptid:existing");

    let cached = manager.cached().await.unwrap();
    assert_eq!(cached.fields.len(), 2);
    assert!(cached.declares(MetadataKey::Author));
    assert!(cached.declares(MetadataKey::IsLocked));
}

#[tokio::test]
async fn test_covered_keys_make_no_update() {
    let server = MockServer::start().await;
    common::mount_template(&server, &MetadataKey::ALL).await;

    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/update_for_user"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = common::client(&server);
    let manager = manager();

    for _ in 0..3 {
        let template_id = manager.ensure(&client, MetadataKey::ALL).await.unwrap();
        assert_eq!(template_id, common::TEMPLATE_ID);
    }
    let subset = manager
        .ensure(&client, [MetadataKey::LocalizedName])
        .await
        .unwrap();
    assert_eq!(subset, common::TEMPLATE_ID);
}

#[tokio::test]
async fn test_concurrent_negotiation_creates_one_template() {
    let server = MockServer::start().await;
    let requested = [MetadataKey::RecordedObjectIdentifier];
    mount_empty_account(&server, &requested).await;

    let client = common::client(&server);
    let manager = manager();

    let (a, b) = tokio::join!(
        manager.ensure(&client, requested),
        manager.ensure(&client, requested)
    );
    assert_eq!(a.unwrap(), common::TEMPLATE_ID);
    assert_eq!(b.unwrap(), common::TEMPLATE_ID);
}

#[tokio::test]
async fn test_template_listing_failure_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/list_for_user"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let client = common::client(&server);
    let manager = manager();

    let result = manager.ensure(&client, [MetadataKey::Author]).await;
    assert!(matches!(
        result,
        Err(harmony_core::domain::ServiceError::ConnectionFailed(_))
    ));
    assert!(manager.cached().await.is_none());
}

#[tokio::test]
async fn test_template_id_reuses_template_without_extending_it() {
    let server = MockServer::start().await;
    common::mount_template(&server, &[MetadataKey::RecordedObjectType]).await;

    for route in ["update_for_user", "add_for_user"] {
        Mock::given(method("POST"))
            .and(path(format!("/2/file_properties/templates/{route}")))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
    }

    let client = common::client(&server);
    let manager = manager();

    let template_id = manager.template_id(&client).await.unwrap();
    assert_eq!(template_id, common::TEMPLATE_ID);
    assert_eq!(manager.template_id(&client).await.unwrap(), common::TEMPLATE_ID);

    let cached = manager.cached().await.unwrap();
    assert_eq!(cached.fields.len(), 1);
    assert_eq!(
        common::request_bodies(&server, "file_properties/templates/list_for_user")
            .await
            .len(),
        1
    );
}

#[tokio::test]
async fn test_template_id_creates_template_when_none_exists() {
    let server = MockServer::start().await;
    mount_empty_account(&server, &MetadataKey::ALL).await;

    let client = common::client(&server);
    let manager = manager();

    let template_id = manager.template_id(&client).await.unwrap();
    assert_eq!(template_id, common::TEMPLATE_ID);

    let added = common::request_bodies(&server, "file_properties/templates/add_for_user").await;
    assert_eq!(
        added[0]["fields"].as_array().unwrap().len(),
        MetadataKey::ALL.len()
    );
}
