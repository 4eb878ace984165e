//! Sync service port (driven/secondary port)
//!
//! This module defines the interface a sync engine uses to talk to a remote
//! storage backend. An implementation does not decide how conflicts are
//! resolved; it reports accurate remote state and revisions and maps every
//! backend outcome onto [`ServiceError`].
//!
//! ## Design Notes
//!
//! - Every operation returns immediately with a [`PendingOperation`]; the
//!   work runs on the Tokio runtime and resolves exactly once.
//! - Record and file operations fail with [`ObjectError`] so failures carry
//!   the affected object's identifier.
//! - No retries happen behind this port. Retry policy belongs to the engine.

use std::collections::HashSet;

use crate::domain::{
    ChangeToken, LocalFile, MetadataMap, MetadataUpdate, ObjectError, PendingOperation,
    RemoteChanges, RemoteFile, RemoteRecord, ServiceError, SyncRecord, Version,
};

/// Port trait for a pluggable remote sync service
pub trait ISyncService: Send + Sync {
    /// Stable reverse-DNS identifier of the service
    fn identifier(&self) -> &str;

    /// Human-readable service name
    fn localized_name(&self) -> &str;

    /// Lists every remote record and returns a checkpoint for later
    /// incremental fetches
    fn fetch_all_remote_records(
        &self,
    ) -> PendingOperation<(HashSet<RemoteRecord>, ChangeToken), ServiceError>;

    /// Lists records changed or deleted since `change_token`
    ///
    /// An undecodable token fails with [`ServiceError::InvalidChangeToken`];
    /// the caller must then fall back to [`fetch_all_remote_records`](Self::fetch_all_remote_records).
    fn fetch_changed_remote_records(
        &self,
        change_token: &ChangeToken,
    ) -> PendingOperation<RemoteChanges, ServiceError>;

    /// Uploads the record's local representation with `metadata`
    ///
    /// Records that already have a remote counterpart are written pinned to
    /// its revision.
    fn upload_record(
        &self,
        record: &SyncRecord,
        metadata: MetadataMap,
    ) -> PendingOperation<RemoteRecord, ObjectError>;

    /// Downloads the record's local representation at `version`
    fn download_record(
        &self,
        record: &SyncRecord,
        version: &Version,
    ) -> PendingOperation<serde_json::Value, ObjectError>;

    /// Deletes the record's remote counterpart
    fn delete_record(&self, record: &SyncRecord) -> PendingOperation<(), ObjectError>;

    /// Applies a metadata diff to the record's remote counterpart
    fn update_metadata(
        &self,
        record: &SyncRecord,
        metadata: MetadataUpdate,
    ) -> PendingOperation<(), ObjectError>;

    /// Lists prior revisions of the record, most recent first
    fn fetch_versions(&self, record: &SyncRecord) -> PendingOperation<Vec<Version>, ObjectError>;

    /// Uploads a payload file belonging to `record`
    fn upload_file(
        &self,
        file: &LocalFile,
        record: &SyncRecord,
        metadata: MetadataMap,
    ) -> PendingOperation<RemoteFile, ObjectError>;

    /// Downloads a payload file to a local temporary location
    fn download_file(&self, remote_file: &RemoteFile) -> PendingOperation<LocalFile, ObjectError>;

    /// Deletes a payload file
    fn delete_file(&self, remote_file: &RemoteFile) -> PendingOperation<(), ObjectError>;

    /// Lists prior revisions of a payload file, most recent first
    fn fetch_file_versions(
        &self,
        remote_file: &RemoteFile,
    ) -> PendingOperation<Vec<Version>, ObjectError>;
}
