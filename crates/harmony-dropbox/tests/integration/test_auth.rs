//! Integration tests for the session lifecycle
//!
//! - Signing in with a token creates the sync directory and the template
//! - An invalid token leaves the service signed out
//! - Background sign-in restores the saved account
//! - Signing out clears credentials and blocks further operations

use std::sync::Arc;

use harmony_core::domain::{AuthenticationError, MetadataKey, ServiceError};
use harmony_core::ports::ISyncService;
use harmony_dropbox::{CredentialStore, DropboxService, MemoryCredentialStore};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_sign_in_creates_directory_and_template() {
    let server = MockServer::start().await;
    common::mount_account(&server).await;

    Mock::given(method("POST"))
        .and(path("/2/files/get_metadata"))
        .and(body_partial_json(json!({"path": "/Harmony"})))
        .respond_with(common::path_not_found())
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/files/create_folder_v2"))
        .and(body_partial_json(json!({"path": "/Harmony", "autorename": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {"name": "Harmony", "path_lower": "/harmony", "id": "id:h"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/list_for_user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"template_ids": []})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/add_for_user"))
        .and(body_partial_json(json!({"name": "Harmony"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"template_id": common::TEMPLATE_ID})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/file_properties/templates/get_for_user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Harmony",
            "description": "Harmony syncing metadata.",
            "fields": common::template_fields(&MetadataKey::ALL)
        })))
        .mount(&server)
        .await;

    let credentials = Arc::new(MemoryCredentialStore::new());
    let service = DropboxService::new(common::config(&server), credentials.clone());

    let account = service
        .authenticate_with_token(common::ACCESS_TOKEN)
        .await
        .expect("sign-in failed");

    assert_eq!(account.account_id, common::ACCOUNT_ID);
    assert_eq!(account.name, common::ACCOUNT_EMAIL);
    assert!(service.is_authenticated());

    // The new template declares every metadata key.
    let added = common::request_bodies(&server, "file_properties/templates/add_for_user").await;
    let fields = added[0]["fields"].as_array().unwrap();
    assert_eq!(fields.len(), MetadataKey::ALL.len());

    assert_eq!(
        credentials.account_id().await.unwrap().as_deref(),
        Some(common::ACCOUNT_ID)
    );
    assert_eq!(
        credentials
            .access_token(common::ACCOUNT_ID)
            .await
            .unwrap()
            .as_deref(),
        Some(common::ACCESS_TOKEN)
    );
}

#[tokio::test]
async fn test_invalid_token_leaves_service_signed_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2/users/get_current_account"))
        .respond_with(common::invalid_access_token())
        .mount(&server)
        .await;

    let credentials = Arc::new(MemoryCredentialStore::new());
    let service = DropboxService::new(common::config(&server), credentials.clone());

    let result = service.authenticate_with_token("revoked-token").await;
    assert!(matches!(
        result,
        Err(AuthenticationError::Other(ServiceError::NotAuthenticated))
    ));
    assert!(!service.is_authenticated());
    assert_eq!(credentials.account_id().await.unwrap(), None);
}

#[tokio::test]
async fn test_background_sign_in_uses_saved_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2/users/get_current_account"))
        .and(header("authorization", "Bearer saved-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "account_id": common::ACCOUNT_ID,
            "email": common::ACCOUNT_EMAIL
        })))
        .expect(1)
        .mount(&server)
        .await;
    common::mount_sync_directory(&server).await;
    common::mount_template(&server, &MetadataKey::ALL).await;

    let credentials = Arc::new(MemoryCredentialStore::with_account(
        common::ACCOUNT_ID,
        "saved-token",
    ));
    let service = DropboxService::new(common::config(&server), credentials);

    let account = service.authenticate_in_background().await.unwrap();
    assert_eq!(account.account_id, common::ACCOUNT_ID);
    assert!(service.is_authenticated());
}

#[tokio::test]
async fn test_background_sign_in_without_token() {
    let server = MockServer::start().await;
    let credentials = Arc::new(MemoryCredentialStore::new());
    credentials
        .set_account_id(Some(common::ACCOUNT_ID))
        .await
        .unwrap();
    let service = DropboxService::new(common::config(&server), credentials);

    let result = service.authenticate_in_background().await;
    assert!(matches!(result, Err(AuthenticationError::NoSavedCredentials)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sign_out_clears_credentials() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;
    assert!(service.is_authenticated());

    service.deauthenticate().await.unwrap();

    assert!(!service.is_authenticated());
    assert!(service.schema().cached().await.is_none());

    let result = service.fetch_all_remote_records().await;
    assert!(matches!(result, Err(ServiceError::NotAuthenticated)));
}

#[tokio::test]
async fn test_second_sign_in_renegotiates_template() {
    let server = MockServer::start().await;
    common::mount_account(&server).await;
    common::mount_sync_directory(&server).await;
    common::mount_template(&server, &MetadataKey::ALL).await;

    let credentials = Arc::new(MemoryCredentialStore::new());
    let service = DropboxService::new(common::config(&server), credentials);

    service.authenticate_with_token("first-token").await.unwrap();
    service.authenticate_with_token("second-token").await.unwrap();

    let listings =
        common::request_bodies(&server, "file_properties/templates/list_for_user").await;
    assert_eq!(listings.len(), 2);

    let requests = server.received_requests().await.unwrap();
    let last_listing = requests
        .iter()
        .filter(|request| request.url.path() == "/2/file_properties/templates/list_for_user")
        .last()
        .unwrap();
    assert_eq!(
        last_listing.headers.get("authorization").unwrap().to_str().unwrap(),
        "Bearer second-token"
    );
    assert_eq!(
        service.schema().cached().await.unwrap().id,
        common::TEMPLATE_ID
    );
}
