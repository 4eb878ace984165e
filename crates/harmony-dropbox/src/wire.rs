//! Dropbox wire types shared by several endpoints

use chrono::{DateTime, Utc};
use harmony_core::domain::{MetadataKey, MetadataMap, RecordStatus, RemoteFile, RemoteRecord, Version};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::debug;

// ============================================================================
// Metadata entries
// ============================================================================

/// An entry returned by listing and lookup endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
pub(crate) enum Metadata {
    File(FileMetadata),
    Folder(FolderMetadata),
    Deleted(DeletedMetadata),
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FileMetadata {
    #[allow(dead_code)]
    pub name: String,
    pub path_lower: Option<String>,
    pub rev: String,
    pub client_modified: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
    pub property_groups: Option<Vec<PropertyGroup>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FolderMetadata {
    #[allow(dead_code)]
    pub name: String,
    #[allow(dead_code)]
    pub path_lower: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DeletedMetadata {
    #[allow(dead_code)]
    pub name: String,
    pub path_lower: Option<String>,
}

impl FileMetadata {
    pub fn version(&self) -> Version {
        Version::new(&self.rev, self.client_modified)
    }

    /// Metadata of the first attached property group
    pub fn metadata(&self) -> Option<MetadataMap> {
        self.property_groups
            .as_ref()
            .and_then(|groups| groups.first())
            .map(PropertyGroup::metadata)
    }

    /// Builds a record snapshot, preferring attached metadata over `fallback`
    ///
    /// Returns `None` when the entry has no path or no metadata is available.
    pub fn to_remote_record(
        &self,
        fallback: Option<&MetadataMap>,
        status: RecordStatus,
    ) -> Option<RemoteRecord> {
        let path = self.path_lower.as_deref()?;
        let metadata = self.metadata().or_else(|| fallback.cloned())?;
        Some(RemoteRecord::new(path, self.version(), metadata, status))
    }

    /// Builds a payload file snapshot for the logical `identifier`
    pub fn to_remote_file(
        &self,
        identifier: &str,
        fallback: Option<&MetadataMap>,
    ) -> Option<RemoteFile> {
        let path = self.path_lower.as_deref()?;
        let metadata = self.metadata().or_else(|| fallback.cloned())?;
        Some(RemoteFile::new(
            identifier,
            path,
            self.version(),
            self.size,
            metadata,
        ))
    }
}

// ============================================================================
// Property groups
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PropertyField {
    pub name: String,
    pub value: String,
}

/// Metadata attached to a file under one property template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PropertyGroup {
    pub template_id: String,
    pub fields: Vec<PropertyField>,
}

impl PropertyGroup {
    pub fn new(template_id: impl Into<String>, metadata: &MetadataMap) -> Self {
        Self {
            template_id: template_id.into(),
            fields: fields_from(metadata),
        }
    }

    /// Converts the fields to metadata, skipping names outside the known keys
    pub fn metadata(&self) -> MetadataMap {
        self.fields
            .iter()
            .filter_map(|field| match field.name.parse::<MetadataKey>() {
                Ok(key) => Some((key, field.value.clone())),
                Err(_) => {
                    debug!(name = %field.name, "Skipping unrecognized property field");
                    None
                }
            })
            .collect()
    }
}

pub(crate) fn fields_from(metadata: &MetadataMap) -> Vec<PropertyField> {
    metadata
        .iter()
        .map(|(key, value)| PropertyField {
            name: key.as_str().to_string(),
            value: value.to_string(),
        })
        .collect()
}

// ============================================================================
// Requests
// ============================================================================

/// `{"path": ...}` argument
#[derive(Debug, Serialize)]
pub(crate) struct PathArg<'a> {
    pub path: &'a str,
}

/// How an upload treats an existing file at the target path
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// Fail if something already exists at the path
    Add,
    /// Replace whatever exists at the path
    Overwrite,
    /// Replace only if the current revision matches
    Update(String),
}

impl Serialize for WriteMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Add => serializer.serialize_str("add"),
            Self::Overwrite => serializer.serialize_str("overwrite"),
            Self::Update(rev) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(".tag", "update")?;
                map.serialize_entry("update", rev)?;
                map.end()
            }
        }
    }
}

/// Argument of `files/upload`
#[derive(Debug, Serialize)]
pub(crate) struct CommitInfo<'a> {
    pub path: &'a str,
    pub mode: WriteMode,
    pub autorename: bool,
    pub mute: bool,
    pub property_groups: Vec<PropertyGroup>,
    pub strict_conflict: bool,
}

/// Argument of `files/download`
#[derive(Debug, Serialize)]
pub(crate) struct DownloadArg<'a> {
    pub path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev: Option<&'a str>,
}
