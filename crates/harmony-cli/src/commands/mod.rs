//! CLI command implementations

pub mod auth;
pub mod changes;
pub mod config;
pub mod delete;
pub mod schema;
pub mod versions;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use harmony_core::config::Config;
use harmony_core::domain::AuthenticationError;
use harmony_dropbox::{DropboxService, KeyringCredentialStore};

/// Resolves `--config`, falling back to the platform default location
pub fn config_path(cli_path: Option<&str>) -> PathBuf {
    cli_path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

/// Builds an unauthenticated service backed by the system keyring
pub fn build_service(config_path: &Path) -> DropboxService {
    let config = Config::load_or_default(config_path);
    DropboxService::new(config, Arc::new(KeyringCredentialStore::new()))
}

/// Builds a service and restores the saved session
pub async fn connect(config_path: &Path) -> Result<DropboxService> {
    let service = build_service(config_path);
    match service.authenticate_in_background().await {
        Ok(_) => Ok(service),
        Err(AuthenticationError::NoSavedCredentials) => {
            anyhow::bail!("Not signed in. Run 'harmony auth login --token <TOKEN>' first")
        }
        Err(e) => Err(e).context("Failed to restore Dropbox session"),
    }
}

/// Treats `target` as an absolute remote path when it starts with `/`,
/// otherwise as an object name inside the sync directory
pub fn resolve_remote_path(service: &DropboxService, target: &str) -> Result<String> {
    if target.starts_with('/') {
        return Ok(target.to_string());
    }
    service
        .paths()
        .remote_path(Some(target))
        .context("dropbox.directory_name must be set in the configuration")
}
