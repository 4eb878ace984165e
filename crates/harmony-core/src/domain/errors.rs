//! Canonical error types
//!
//! Every backend outcome an adapter can observe is reduced to one
//! [`ServiceError`] kind. Failures that concern a specific record or file are
//! wrapped in an [`ObjectError`] so the engine can correlate them per object.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use super::metadata::MetadataKey;

/// Boxed native error carried by [`ServiceError::ConnectionFailed`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Canonical error kinds reported by a sync service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No authenticated session is available
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Transport-level or backend failure, wrapping the native cause
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] BoxError),

    /// The backend reported success without a usable payload, or vice versa
    #[error("Invalid response from server")]
    InvalidResponse,

    /// The backend confirmed that the object does not exist
    #[error("{0} does not exist")]
    DoesNotExist(String),

    /// A change token could not be decoded; the caller must resync fully
    #[error("Invalid change token ({} bytes)", .0.len())]
    InvalidChangeToken(Vec<u8>),

    /// A required local precondition was not met
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A write pinned to a revision was rejected because the remote changed
    #[error("{0} was modified remotely")]
    Conflicted(String),

    /// The operation was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,
}

impl ServiceError {
    /// Wraps any native error as [`ServiceError::ConnectionFailed`]
    pub fn connection_failed(error: impl Into<BoxError>) -> Self {
        Self::ConnectionFailed(error.into())
    }

    /// Returns true if this is [`ServiceError::Cancelled`]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Local precondition failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The record has no local representation to upload
    #[error("Record has no local counterpart")]
    NilLocalRecord,

    /// The record has no remote counterpart yet
    #[error("Record has no remote counterpart")]
    NilRemoteRecord,

    /// No remote root directory name is configured
    #[error("There is no configured remote directory name")]
    NilDirectoryName,

    /// A metadata value was present but not a string
    #[error("Metadata value for {0} is not a string")]
    InvalidMetadataValue(MetadataKey),

    /// A metadata key is not part of the recognized enumeration
    #[error("Unknown metadata key: {0}")]
    UnknownMetadataKey(String),
}

/// Kind of synchronized object an [`ObjectError`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A structured sync record
    Record,
    /// An opaque payload file
    File,
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record => write!(f, "record"),
            Self::File => write!(f, "file"),
        }
    }
}

/// A [`ServiceError`] tied to the record or file it affected
#[derive(Debug, Error)]
#[error("{kind} {identifier}: {source}")]
pub struct ObjectError {
    /// Which kind of object failed
    pub kind: ObjectKind,
    /// Identifier of the affected object
    pub identifier: String,
    /// The canonical error
    #[source]
    pub source: ServiceError,
}

impl ObjectError {
    /// Creates an error for a record
    pub fn record(identifier: impl Into<String>, source: impl Into<ServiceError>) -> Self {
        Self {
            kind: ObjectKind::Record,
            identifier: identifier.into(),
            source: source.into(),
        }
    }

    /// Creates an error for a file
    pub fn file(identifier: impl Into<String>, source: impl Into<ServiceError>) -> Self {
        Self {
            kind: ObjectKind::File,
            identifier: identifier.into(),
            source: source.into(),
        }
    }

    /// The wrapped canonical error
    #[must_use]
    pub fn error(&self) -> &ServiceError {
        &self.source
    }
}

/// Errors from establishing or tearing down a session
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// No persisted account identifier or credential was found
    #[error("No saved credentials")]
    NoSavedCredentials,

    /// Any other failure while finishing authentication
    #[error(transparent)]
    Other(#[from] ServiceError),
}
