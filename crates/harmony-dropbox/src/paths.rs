//! Remote path resolution
//!
//! All synchronized content lives under a single root directory. Records are
//! stored as `/{root}/{recordType}-{recordIdentifier}` and payload files as
//! `/{root}/{recordType}-{recordIdentifier}-{fileIdentifier}`.

use harmony_core::domain::{RecordId, ValidationError};

/// Builds remote paths under the configured root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    directory_name: Option<String>,
}

impl PathResolver {
    pub fn new(directory_name: Option<String>) -> Self {
        Self { directory_name }
    }

    pub fn directory_name(&self) -> Option<&str> {
        self.directory_name.as_deref()
    }

    /// Path of `filename` inside the root, or of the root itself
    ///
    /// Fails with [`ValidationError::NilDirectoryName`] when no root is
    /// configured.
    pub fn remote_path(&self, filename: Option<&str>) -> Result<String, ValidationError> {
        let directory = self
            .directory_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(ValidationError::NilDirectoryName)?;

        Ok(match filename {
            Some(filename) => format!("/{}/{}", directory, filename),
            None => format!("/{}", directory),
        })
    }

    pub fn root(&self) -> Result<String, ValidationError> {
        self.remote_path(None)
    }

    pub fn record_path(&self, record_id: &RecordId) -> Result<String, ValidationError> {
        self.remote_path(Some(&record_id.to_string()))
    }

    pub fn file_path(
        &self,
        record_id: &RecordId,
        file_identifier: &str,
    ) -> Result<String, ValidationError> {
        self.remote_path(Some(&format!("{}-{}", record_id, file_identifier)))
    }
}
