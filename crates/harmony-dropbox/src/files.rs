//! Payload file transfer
//!
//! Payload files live next to their record at
//! `/{root}/{recordType}-{recordIdentifier}-{fileIdentifier}` and are always
//! overwritten on upload. Downloads are streamed into a fresh file under the
//! system temporary directory; the caller owns and moves it afterwards. A
//! download that fails or is cancelled part-way removes its partial file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use harmony_core::domain::{LocalFile, MetadataMap, Progress, RecordId, RemoteFile, ServiceError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::service::OperationContext;
use crate::translate::{process_object, process_unit};
use crate::wire::{CommitInfo, DownloadArg, FileMetadata, PathArg, PropertyGroup, WriteMode};

pub(crate) async fn upload(
    ctx: &OperationContext,
    file: &LocalFile,
    record_id: &RecordId,
    metadata: &MetadataMap,
    progress: &Progress,
) -> Result<RemoteFile, ServiceError> {
    let template_id = ctx.schema.ensure(&ctx.client, metadata.keys()).await?;
    let path = ctx.paths.file_path(record_id, &file.identifier)?;

    let data = tokio::fs::read(&file.path)
        .await
        .map_err(ServiceError::connection_failed)?;

    debug!(
        file = %file.identifier,
        path = %path,
        bytes = data.len(),
        "Uploading file"
    );

    let arg = CommitInfo {
        path: &path,
        mode: WriteMode::Overwrite,
        autorename: false,
        mute: false,
        property_groups: vec![PropertyGroup::new(template_id, metadata)],
        strict_conflict: false,
    };
    let uploaded: FileMetadata = process_object(
        ctx.client
            .upload("files/upload", &arg, data, Some(progress))
            .await,
        &file.identifier,
    )?;

    let remote = uploaded
        .to_remote_file(&file.identifier, Some(metadata))
        .ok_or(ServiceError::InvalidResponse)?;
    info!(file = %file.identifier, rev = %remote.version().identifier, "Uploaded file");
    Ok(remote)
}

pub(crate) async fn download(
    ctx: &OperationContext,
    remote_file: &RemoteFile,
    progress: &Progress,
) -> Result<LocalFile, ServiceError> {
    let identifier = remote_file.identifier();
    let arg = DownloadArg {
        path: remote_file.remote_identifier(),
        rev: Some(&remote_file.version().identifier),
    };

    let partial = PartialDownload::new(temporary_path());
    let downloaded: FileMetadata = process_object(
        ctx.client
            .download_to_file("files/download", &arg, partial.path(), Some(progress))
            .await,
        identifier,
    )?;
    let destination = partial.keep();

    debug!(
        file = identifier,
        bytes = downloaded.size,
        destination = %destination.display(),
        "Downloaded file"
    );
    Ok(LocalFile::new(identifier, destination))
}

pub(crate) async fn delete(ctx: &OperationContext, remote_file: &RemoteFile) -> Result<(), ServiceError> {
    debug!(file = remote_file.identifier(), "Deleting file");
    process_unit(
        ctx.client
            .rpc_unit(
                "files/delete_v2",
                &PathArg {
                    path: remote_file.remote_identifier(),
                },
            )
            .await,
        Some(remote_file.identifier()),
    )
}

fn temporary_path() -> PathBuf {
    std::env::temp_dir().join(Uuid::new_v4().to_string())
}

/// Download target that is removed on drop unless kept
///
/// Dropping covers both errors and cancellation, which abandons the
/// download future mid-stream.
struct PartialDownload {
    path: PathBuf,
    kept: bool,
}

impl PartialDownload {
    fn new(path: PathBuf) -> Self {
        Self { path, kept: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) -> PathBuf {
        self.kept = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial download"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove partial download"),
        }
    }
}
