//! Revision history

use harmony_core::domain::{ServiceError, Version};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::DropboxClient;
use crate::translate::process_object;
use crate::wire::FileMetadata;

#[derive(Debug, Serialize)]
struct ListRevisionsArg<'a> {
    path: &'a str,
    mode: &'static str,
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct ListRevisionsResult {
    #[serde(default)]
    is_deleted: bool,
    entries: Vec<FileMetadata>,
}

/// Lists up to `limit` revisions of the file at `path`, most recent first
///
/// `identifier` names the object in a not-found error.
pub(crate) async fn list(
    client: &DropboxClient,
    path: &str,
    identifier: &str,
    limit: u32,
) -> Result<Vec<Version>, ServiceError> {
    let arg = ListRevisionsArg {
        path,
        mode: "path",
        limit,
    };
    let result: ListRevisionsResult =
        process_object(client.rpc("files/list_revisions", &arg).await, identifier)?;

    debug!(
        path,
        revisions = result.entries.len(),
        is_deleted = result.is_deleted,
        "Listed revisions"
    );

    Ok(result
        .entries
        .iter()
        .take(limit as usize)
        .map(FileMetadata::version)
        .collect())
}
