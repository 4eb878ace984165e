//! Synchronized object snapshots
//!
//! Remote values ([`RemoteRecord`], [`RemoteFile`], [`Version`]) are
//! immutable: a revision change produces a new value rather than mutating
//! an existing one.

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::change_token::ChangeToken;
use super::metadata::MetadataMap;

/// Identifies a record by its type and identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub record_type: String,
    pub identifier: String,
}

impl RecordId {
    pub fn new(record_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            identifier: identifier.into(),
        }
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.record_type, self.identifier)
    }
}

/// How a remote record was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    /// Seen in a full listing or produced by an upload
    Normal,
    /// Reported by an incremental listing
    Updated,
}

/// One point in an object's revision history
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Backend-assigned revision identifier
    pub identifier: String,
    /// Timestamp of the revision
    pub date: DateTime<Utc>,
}

impl Version {
    pub fn new(identifier: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.into(),
            date,
        }
    }
}

/// Remote state of a sync record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteRecord {
    identifier: String,
    version: Version,
    metadata: MetadataMap,
    status: RecordStatus,
}

impl RemoteRecord {
    /// Creates a snapshot; the identifier is lowercase-normalized
    pub fn new(
        identifier: &str,
        version: Version,
        metadata: MetadataMap,
        status: RecordStatus,
    ) -> Self {
        Self {
            identifier: identifier.to_lowercase(),
            version,
            metadata,
            status,
        }
    }

    /// Lowercase remote path of the record
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    #[must_use]
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    #[must_use]
    pub fn status(&self) -> RecordStatus {
        self.status
    }
}

/// Remote state of a payload file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteFile {
    identifier: String,
    remote_identifier: String,
    version: Version,
    size: u64,
    metadata: MetadataMap,
}

impl RemoteFile {
    /// Creates a snapshot; the remote identifier is lowercase-normalized
    pub fn new(
        identifier: impl Into<String>,
        remote_identifier: &str,
        version: Version,
        size: u64,
        metadata: MetadataMap,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            remote_identifier: remote_identifier.to_lowercase(),
            version,
            size,
            metadata,
        }
    }

    /// Logical file identifier supplied by the engine
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Lowercase remote path of the file
    #[must_use]
    pub fn remote_identifier(&self) -> &str {
        &self.remote_identifier
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Size in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }
}

/// Result of an incremental enumeration
#[derive(Debug, Clone)]
pub struct RemoteChanges {
    /// Records created or modified since the previous token
    pub updated: HashSet<RemoteRecord>,
    /// Identifiers of records deleted since the previous token
    pub deleted: HashSet<String>,
    /// Checkpoint to resume from next time
    pub change_token: ChangeToken,
}

/// The engine's view of one managed record
#[derive(Debug, Clone)]
pub struct SyncRecord {
    pub record_id: RecordId,
    /// Serializable local representation, if any
    pub local: Option<serde_json::Value>,
    /// Last known remote state, if the record was ever uploaded
    pub remote: Option<RemoteRecord>,
}

impl SyncRecord {
    pub fn new(record_id: RecordId) -> Self {
        Self {
            record_id,
            local: None,
            remote: None,
        }
    }

    #[must_use]
    pub fn with_local(mut self, local: serde_json::Value) -> Self {
        self.local = Some(local);
        self
    }

    #[must_use]
    pub fn with_remote(mut self, remote: RemoteRecord) -> Self {
        self.remote = Some(remote);
        self
    }
}

/// A payload file on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub identifier: String,
    pub path: PathBuf,
}

impl LocalFile {
    pub fn new(identifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            path: path.into(),
        }
    }
}

/// The account a session is authenticated as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Backend account identifier (persisted across restarts)
    pub account_id: String,
    /// Display name, usually the account email
    pub name: String,
}
