//! Integration tests for cancellation
//!
//! A cancelled operation resolves once with `Cancelled`, even when the
//! server would have answered later.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use harmony_core::domain::{
    MetadataKey, MetadataMap, ObjectKind, RecordId, RemoteFile, ServiceError, SyncRecord, Version,
};
use harmony_core::ports::ISyncService;
use serde_json::json;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn record() -> SyncRecord {
    SyncRecord::new(RecordId::new("Game", "1")).with_local(json!({"name": "Metroid"}))
}

async fn mount_slow_upload(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/2/files/upload"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::file_entry("Game-1", "a1", &[]))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_cancel_before_response_resolves_cancelled() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;
    mount_slow_upload(&server).await;

    let metadata = MetadataMap::from([(MetadataKey::RecordedObjectType, "Game")]);
    let operation = service.upload_record(&record(), metadata);
    operation.cancel();

    let err = operation.await.unwrap_err();
    assert_eq!(err.identifier, "Game-1");
    assert!(err.source.is_cancelled());
}

#[tokio::test]
async fn test_cancelled_callback_fires_once() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;
    mount_slow_upload(&server).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel();

    let counter = Arc::clone(&calls);
    let progress = service
        .upload_record(&record(), MetadataMap::new())
        .on_completion(move |result| {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(result.map(|_| ()).map_err(|e| e.source.is_cancelled()));
        });
    progress.cancel();

    assert_eq!(rx.await.unwrap(), Err(true));

    // Outlive the delayed response; nothing further may be delivered.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancelled_download_ignores_late_response() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;

    let entry = common::file_entry("GameSave-abc-gameSave", "s1", &[]);
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Dropbox-API-Result", entry.to_string().as_str())
                .set_body_bytes(b"save".to_vec())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let remote = RemoteFile::new(
        "gameSave",
        "/harmony/gamesave-abc-gamesave",
        Version::new("s1", "2019-03-04T10:00:00Z".parse().unwrap()),
        4,
        MetadataMap::new(),
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel();
    let counter = Arc::clone(&calls);
    let progress = service.download_file(&remote).on_completion(move |result| {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(result.map(|_| ()).map_err(|e| (e.kind, e.source.is_cancelled())));
    });
    progress.cancel();

    assert_eq!(rx.await.unwrap(), Err((ObjectKind::File, true)));

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_after_completion_keeps_result() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [],
            "cursor": "done",
            "has_more": false
        })))
        .mount(&server)
        .await;

    let operation = service.fetch_all_remote_records();
    let mut updates = operation.progress().subscribe();
    while !operation.progress().is_finished() {
        updates.changed().await.unwrap();
    }
    operation.cancel();

    let result = operation.await;
    assert!(!matches!(result, Err(ServiceError::Cancelled)));
    let (records, token) = result.unwrap();
    assert!(records.is_empty());
    assert_eq!(token.as_bytes(), b"done");
}
