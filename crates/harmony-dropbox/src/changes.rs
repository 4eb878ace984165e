//! Incremental listing of the sync directory
//!
//! Dropbox listings are cursor based:
//!
//! 1. **Full listing**: `files/list_folder` on the root returns the first page
//!    and a cursor.
//! 2. **Follow pages**: while `has_more` is set, `files/list_folder/continue`
//!    with the latest cursor returns the next page.
//! 3. **Checkpoint**: the cursor of the final page, as UTF-8 bytes, is the
//!    [`ChangeToken`] handed back to the engine.
//! 4. **Incremental listing**: decoding a saved token yields the cursor to
//!    continue from, so only changes since that checkpoint are returned.
//!
//! Results are unioned across pages, so the page size never changes the
//! outcome. A listing that fails part-way returns the error and no token.

use std::collections::HashSet;

use harmony_core::domain::{ChangeToken, RecordStatus, RemoteChanges, RemoteRecord, ServiceError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::DropboxClient;
use crate::translate::process;
use crate::wire::Metadata;

const LIST_FOLDER: &str = "files/list_folder";
const LIST_FOLDER_CONTINUE: &str = "files/list_folder/continue";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ListFolderArg<'a> {
    path: &'a str,
    recursive: bool,
    include_deleted: bool,
    include_property_groups: TemplateFilter,
}

/// `{".tag": "filter_some", "filter_some": [template ids]}`
#[derive(Debug, Serialize)]
struct TemplateFilter {
    #[serde(rename = ".tag")]
    tag: &'static str,
    filter_some: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ListFolderContinueArg<'a> {
    cursor: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListFolderResult {
    entries: Vec<Metadata>,
    cursor: String,
    has_more: bool,
}

// ============================================================================
// Change tokens
// ============================================================================

/// Wraps a listing cursor as an opaque change token
///
/// Fails with [`ServiceError::InvalidResponse`] for an empty cursor, which
/// could not be resumed from.
pub fn encode_cursor(cursor: &str) -> Result<ChangeToken, ServiceError> {
    if cursor.is_empty() {
        warn!("Listing finished with an empty cursor");
        return Err(ServiceError::InvalidResponse);
    }
    Ok(ChangeToken::from(cursor.as_bytes().to_vec()))
}

/// Recovers the listing cursor from a change token
///
/// Tokens that are not valid UTF-8 fail with
/// [`ServiceError::InvalidChangeToken`] carrying the raw bytes.
pub fn decode_change_token(token: &ChangeToken) -> Result<String, ServiceError> {
    match std::str::from_utf8(token.as_bytes()) {
        Ok(cursor) if !cursor.is_empty() => Ok(cursor.to_string()),
        _ => Err(ServiceError::InvalidChangeToken(token.as_bytes().to_vec())),
    }
}

// ============================================================================
// ChangeSet
// ============================================================================

/// Union of the records and deletions seen across listing pages
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub updated: HashSet<RemoteRecord>,
    pub deleted: HashSet<String>,
}

impl ChangeSet {
    /// Folds one page of entries into the set
    ///
    /// File entries without a path or metadata are skipped. Folders are
    /// ignored.
    pub(crate) fn absorb(&mut self, entries: Vec<Metadata>, status: RecordStatus) {
        for entry in entries {
            match entry {
                Metadata::File(file) => match file.to_remote_record(None, status) {
                    Some(record) => {
                        self.updated.insert(record);
                    }
                    None => {
                        debug!(path = ?file.path_lower, "Skipping file without record metadata");
                    }
                },
                Metadata::Deleted(deleted) => {
                    if let Some(path) = deleted.path_lower {
                        self.deleted.insert(path);
                    }
                }
                Metadata::Folder(_) => {}
            }
        }
    }

    fn into_changes(self, change_token: ChangeToken) -> RemoteChanges {
        RemoteChanges {
            updated: self.updated,
            deleted: self.deleted,
            change_token,
        }
    }
}

// ============================================================================
// Enumeration
// ============================================================================

/// Where and how to list
#[derive(Debug, Clone)]
pub struct ListingScope<'a> {
    /// Remote root directory, e.g. `/Harmony`
    pub root: &'a str,
    /// Property template whose groups should be included
    pub template_id: &'a str,
    /// Upper bound on pages fetched in one enumeration
    pub max_pages: Option<u32>,
}

/// Lists the root, either fully or continuing from `cursor`
///
/// Records are tagged [`RecordStatus::Normal`] for a full listing and
/// [`RecordStatus::Updated`] for an incremental one.
///
/// A server that keeps reporting `has_more` without advancing the cursor,
/// or that exceeds `scope.max_pages`, fails with
/// [`ServiceError::InvalidResponse`].
pub async fn enumerate(
    client: &DropboxClient,
    scope: &ListingScope<'_>,
    cursor: Option<&str>,
) -> Result<RemoteChanges, ServiceError> {
    let status = if cursor.is_some() {
        RecordStatus::Updated
    } else {
        RecordStatus::Normal
    };

    debug!(
        root = scope.root,
        incremental = cursor.is_some(),
        "Starting remote enumeration"
    );

    let mut page = match cursor {
        Some(cursor) => list_folder_continue(client, cursor).await?,
        None => {
            let arg = ListFolderArg {
                path: scope.root,
                recursive: false,
                include_deleted: true,
                include_property_groups: TemplateFilter {
                    tag: "filter_some",
                    filter_some: vec![scope.template_id.to_string()],
                },
            };
            process(client.rpc(LIST_FOLDER, &arg).await)?
        }
    };

    let mut changes = ChangeSet::default();
    let mut page_count: u32 = 1;
    let mut previous_cursor = cursor.map(str::to_string);

    loop {
        debug!(
            page = page_count,
            entries = page.entries.len(),
            has_more = page.has_more,
            "Received listing page"
        );
        changes.absorb(page.entries, status);

        if !page.has_more {
            break;
        }

        if previous_cursor.as_deref() == Some(page.cursor.as_str()) {
            warn!(page = page_count, "Listing cursor did not advance");
            return Err(ServiceError::InvalidResponse);
        }
        if scope.max_pages.is_some_and(|max| page_count >= max) {
            warn!(pages = page_count, "Listing exceeded page limit");
            return Err(ServiceError::InvalidResponse);
        }

        let next = list_folder_continue(client, &page.cursor).await?;
        previous_cursor = Some(page.cursor);
        page = next;
        page_count += 1;
    }

    let change_token = encode_cursor(&page.cursor)?;

    debug!(
        updated = changes.updated.len(),
        deleted = changes.deleted.len(),
        pages = page_count,
        "Remote enumeration complete"
    );

    Ok(changes.into_changes(change_token))
}

async fn list_folder_continue(
    client: &DropboxClient,
    cursor: &str,
) -> Result<ListFolderResult, ServiceError> {
    process(
        client
            .rpc(LIST_FOLDER_CONTINUE, &ListFolderContinueArg { cursor })
            .await,
    )
}
