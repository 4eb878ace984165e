//! Record upload, download, deletion and metadata updates
//!
//! A record is stored as a JSON file at `/{root}/{recordType}-{identifier}`
//! with its metadata in a property group. Records that already exist
//! remotely are overwritten only if their revision is unchanged.

use harmony_core::domain::{
    MetadataMap, MetadataUpdate, Progress, RecordStatus, RemoteRecord, ServiceError, SyncRecord,
    ValidationError, Version,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::service::OperationContext;
use crate::translate::{process_object, process_unit};
use crate::wire::{
    fields_from, CommitInfo, DownloadArg, FileMetadata, PathArg, PropertyField, PropertyGroup,
    WriteMode,
};

#[derive(Debug, Serialize)]
struct UpdatePropertiesArg<'a> {
    path: &'a str,
    update_property_groups: Vec<PropertyGroupUpdate>,
}

#[derive(Debug, Serialize)]
struct PropertyGroupUpdate {
    template_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    add_or_update_fields: Option<Vec<PropertyField>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remove_fields: Option<Vec<String>>,
}

impl PropertyGroupUpdate {
    fn new(template_id: String, update: &MetadataUpdate) -> Self {
        let (updated, removed) = update.partition();
        Self {
            template_id,
            add_or_update_fields: (!updated.is_empty()).then(|| fields_from(&updated)),
            remove_fields: (!removed.is_empty())
                .then(|| removed.iter().map(|key| key.as_str().to_string()).collect()),
        }
    }
}

pub(crate) async fn upload(
    ctx: &OperationContext,
    record: &SyncRecord,
    metadata: &MetadataMap,
    progress: &Progress,
) -> Result<RemoteRecord, ServiceError> {
    let record_id = record.record_id.to_string();
    let template_id = ctx.schema.ensure(&ctx.client, metadata.keys()).await?;

    let local = record.local.as_ref().ok_or(ValidationError::NilLocalRecord)?;
    let data = serde_json::to_vec(local).map_err(ServiceError::connection_failed)?;

    let (path, mode) = match &record.remote {
        Some(remote) => (
            remote.identifier().to_string(),
            WriteMode::Update(remote.version().identifier.clone()),
        ),
        None => (ctx.paths.record_path(&record.record_id)?, WriteMode::Add),
    };

    debug!(record = %record_id, path = %path, mode = ?mode, "Uploading record");

    let arg = CommitInfo {
        path: &path,
        mode,
        autorename: false,
        mute: true,
        property_groups: vec![PropertyGroup::new(template_id, metadata)],
        strict_conflict: false,
    };
    let file: FileMetadata = process_object(
        ctx.client
            .upload("files/upload", &arg, data, Some(progress))
            .await,
        &record_id,
    )?;

    let remote = file
        .to_remote_record(Some(metadata), RecordStatus::Normal)
        .ok_or(ServiceError::InvalidResponse)?;
    info!(record = %record_id, rev = %remote.version().identifier, "Uploaded record");
    Ok(remote)
}

pub(crate) async fn download(
    ctx: &OperationContext,
    record: &SyncRecord,
    version: &Version,
    progress: &Progress,
) -> Result<serde_json::Value, ServiceError> {
    let record_id = record.record_id.to_string();
    let remote = record.remote.as_ref().ok_or(ValidationError::NilRemoteRecord)?;

    debug!(record = %record_id, rev = %version.identifier, "Downloading record");

    let arg = DownloadArg {
        path: remote.identifier(),
        rev: Some(&version.identifier),
    };
    let download = process_object(
        ctx.client
            .download::<_, FileMetadata>("files/download", &arg, Some(progress))
            .await,
        &record_id,
    )?;

    serde_json::from_slice(&download.bytes).map_err(|e| {
        debug!(record = %record_id, error = %e, "Downloaded record is not valid JSON");
        ServiceError::InvalidResponse
    })
}

pub(crate) async fn delete(ctx: &OperationContext, record: &SyncRecord) -> Result<(), ServiceError> {
    let record_id = record.record_id.to_string();
    let remote = record.remote.as_ref().ok_or(ValidationError::NilRemoteRecord)?;

    debug!(record = %record_id, path = remote.identifier(), "Deleting record");

    process_unit(
        ctx.client
            .rpc_unit("files/delete_v2", &PathArg { path: remote.identifier() })
            .await,
        Some(&record_id),
    )?;
    info!(record = %record_id, "Deleted record");
    Ok(())
}

pub(crate) async fn update_metadata(
    ctx: &OperationContext,
    record: &SyncRecord,
    update: &MetadataUpdate,
) -> Result<(), ServiceError> {
    let record_id = record.record_id.to_string();
    let template_id = ctx.schema.ensure(&ctx.client, update.keys()).await?;
    let remote = record.remote.as_ref().ok_or(ValidationError::NilRemoteRecord)?;

    let group = PropertyGroupUpdate::new(template_id, update);
    debug!(
        record = %record_id,
        updated = group.add_or_update_fields.as_ref().map_or(0, Vec::len),
        removed = group.remove_fields.as_ref().map_or(0, Vec::len),
        "Updating record metadata"
    );

    let arg = UpdatePropertiesArg {
        path: remote.identifier(),
        update_property_groups: vec![group],
    };
    process_unit(
        ctx.client
            .rpc_unit("file_properties/properties/update", &arg)
            .await,
        Some(&record_id),
    )
}
