//! Domain entities and value types
//!
//! This module contains the provider-agnostic types exchanged between a sync
//! engine and a storage adapter:
//! - Remote object snapshots (records, files, versions)
//! - Metadata keys and typed metadata maps
//! - The opaque change token
//! - Canonical error types
//! - Progress and cancellation handles

pub mod change_token;
pub mod errors;
pub mod metadata;
pub mod progress;
pub mod record;

// Re-export commonly used types
pub use change_token::ChangeToken;
pub use errors::{AuthenticationError, ObjectError, ObjectKind, ServiceError, ValidationError};
pub use metadata::{MetadataKey, MetadataMap, MetadataUpdate};
pub use progress::{PendingOperation, Progress};
pub use record::{
    Account, LocalFile, RecordId, RecordStatus, RemoteChanges, RemoteFile, RemoteRecord,
    SyncRecord, Version,
};
