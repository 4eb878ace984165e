//! Integration tests for payload file transfer

use harmony_core::domain::{
    LocalFile, MetadataKey, MetadataMap, ObjectKind, RecordId, RemoteFile, ServiceError,
    SyncRecord, Version,
};
use harmony_core::ports::ISyncService;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn save_metadata() -> MetadataMap {
    MetadataMap::from([(MetadataKey::Sha1Hash, "9c1185a5c5e9fc54612808977ee8f548b2258d31")])
}

fn owner() -> SyncRecord {
    SyncRecord::new(RecordId::new("GameSave", "abc"))
}

#[tokio::test]
async fn test_upload_download_delete_file() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;
    let store = common::mount_content_store(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("save.sav");
    let contents: Vec<u8> = (0..=255u8).cycle().take(200 * 1024).collect();
    tokio::fs::write(&source, &contents).await.unwrap();

    let local = LocalFile::new("gameSave", &source);
    let upload = service.upload_file(&local, &owner(), save_metadata());
    let progress = upload.progress().clone();
    let remote = upload.await.expect("upload failed");

    assert_eq!(remote.identifier(), "gameSave");
    assert_eq!(remote.remote_identifier(), "/harmony/gamesave-abc-gamesave");
    assert_eq!(remote.size(), contents.len() as u64);
    assert_eq!(remote.metadata(), &save_metadata());
    assert!(progress.is_finished());

    let args = common::request_args(&server, "files/upload").await;
    assert_eq!(args[0]["path"], "/Harmony/GameSave-abc-gameSave");
    assert_eq!(args[0]["mode"], "overwrite");
    assert_eq!(
        store.get("/harmony/gamesave-abc-gamesave").unwrap().bytes,
        contents
    );

    let downloaded = service
        .download_file(&remote)
        .await
        .expect("download failed");
    assert_eq!(downloaded.identifier, "gameSave");
    assert_ne!(downloaded.path, source);
    assert_eq!(tokio::fs::read(&downloaded.path).await.unwrap(), contents);
    tokio::fs::remove_file(&downloaded.path).await.unwrap();

    service.delete_file(&remote).await.expect("delete failed");
    assert_eq!(store.len(), 0);

    let err = service.download_file(&remote).await.unwrap_err();
    assert_eq!(err.kind, ObjectKind::File);
    assert!(matches!(err.source, ServiceError::DoesNotExist(ref id) if id == "gameSave"));
}

#[tokio::test]
async fn test_reupload_overwrites() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;
    let store = common::mount_content_store(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("rom.gba");
    let local = LocalFile::new("rom", &source);

    tokio::fs::write(&source, b"first").await.unwrap();
    let first = service
        .upload_file(&local, &owner(), save_metadata())
        .await
        .unwrap();

    tokio::fs::write(&source, b"second").await.unwrap();
    let second = service
        .upload_file(&local, &owner(), save_metadata())
        .await
        .unwrap();

    assert_eq!(first.remote_identifier(), second.remote_identifier());
    assert_ne!(first.version(), second.version());
    assert_eq!(store.len(), 1);
    assert_eq!(
        store.get(second.remote_identifier()).unwrap().bytes,
        b"second".to_vec()
    );
}

#[tokio::test]
async fn test_unreadable_local_file_fails() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;
    common::mount_content_store(&server).await;

    let local = LocalFile::new("missing", "/nonexistent/harmony/missing.sav");
    let err = service
        .upload_file(&local, &owner(), save_metadata())
        .await
        .unwrap_err();
    assert_eq!(err.identifier, "missing");
    assert!(matches!(err.source, ServiceError::ConnectionFailed(_)));
}

#[tokio::test]
async fn test_fetch_file_versions() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;
    common::mount_content_store(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("save.sav");
    tokio::fs::write(&source, b"save").await.unwrap();
    let remote = service
        .upload_file(&LocalFile::new("gameSave", &source), &owner(), save_metadata())
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/2/files/list_revisions"))
        .and(body_partial_json(json!({"path": "/harmony/gamesave-abc-gamesave"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_deleted": false,
            "entries": [
                {"name": "GameSave-abc-gameSave", "path_lower": "/harmony/gamesave-abc-gamesave",
                 "rev": remote.version().identifier, "client_modified": "2019-03-04T10:00:00Z",
                 "size": 4}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let versions = service.fetch_file_versions(&remote).await.unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].identifier, remote.version().identifier);
}

#[tokio::test]
async fn test_download_streams_large_body_to_disk() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;

    // Several times the transport's chunk size.
    let contents: Vec<u8> = (0..=250u8).cycle().take(1024 * 1024 + 17).collect();
    let entry = common::file_entry("GameSave-abc-gameSave", "s9", &[]);
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Dropbox-API-Result", entry.to_string().as_str())
                .set_body_bytes(contents.clone()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let remote = RemoteFile::new(
        "gameSave",
        "/harmony/gamesave-abc-gamesave",
        Version::new("s9", "2019-03-04T10:00:00Z".parse().unwrap()),
        contents.len() as u64,
        MetadataMap::new(),
    );

    let operation = service.download_file(&remote);
    let progress = operation.progress().clone();
    let local = operation.await.expect("download failed");

    assert_eq!(tokio::fs::read(&local.path).await.unwrap(), contents);
    assert_eq!(progress.total(), contents.len() as u64);
    assert_eq!(progress.completed(), contents.len() as u64);
    assert!(progress.is_finished());
    tokio::fs::remove_file(&local.path).await.unwrap();
}

#[tokio::test]
async fn test_download_without_result_header_is_invalid_response() {
    let server = MockServer::start().await;
    let service = common::authenticated_service(&server).await;

    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"orphan".to_vec()))
        .mount(&server)
        .await;

    let remote = RemoteFile::new(
        "gameSave",
        "/harmony/gamesave-abc-gamesave",
        Version::new("s1", "2019-03-04T10:00:00Z".parse().unwrap()),
        6,
        MetadataMap::new(),
    );

    let err = service.download_file(&remote).await.unwrap_err();
    assert_eq!(err.identifier, "gameSave");
    assert!(matches!(err.source, ServiceError::InvalidResponse));
}
