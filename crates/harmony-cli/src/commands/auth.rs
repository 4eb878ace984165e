//! Auth commands - Login, Logout, and Status for Dropbox authentication
//!
//! Provides the `harmony auth` CLI subcommands which:
//! 1. `login`  - Verifies an access token, prepares the sync directory and
//!    metadata template, and stores the token in the system keyring.
//! 2. `logout` - Clears the stored token and account id.
//! 3. `status` - Restores the saved session and shows the account.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use harmony_core::domain::AuthenticationError;
use harmony_dropbox::service::SERVICE_NAME;
use tracing::info;

use super::build_service;
use crate::output::{OutputFormatter, OutputOptions};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Sign in with a Dropbox access token
    Login {
        /// Access token issued for the Harmony app
        #[arg(long, env = "HARMONY_DROPBOX_TOKEN", hide_env_values = true)]
        token: String,
    },
    /// Remove stored credentials
    Logout,
    /// Check authentication status
    Status,
}

impl AuthCommand {
    pub async fn execute(&self, output: OutputOptions, config_path: &Path) -> Result<()> {
        let fmt = output.formatter();
        match self {
            AuthCommand::Login { token } => {
                self.execute_login(token, config_path, &*fmt, output).await
            }
            AuthCommand::Logout => self.execute_logout(config_path, &*fmt, output).await,
            AuthCommand::Status => self.execute_status(config_path, &*fmt, output).await,
        }
    }

    async fn execute_login(
        &self,
        token: &str,
        config_path: &Path,
        fmt: &dyn OutputFormatter,
        output: OutputOptions,
    ) -> Result<()> {
        let service = build_service(config_path);
        let root = service
            .paths()
            .root()
            .context("dropbox.directory_name must be set in the configuration")?;

        info!(root = %root, "Starting Dropbox login");
        fmt.info(&format!("Connecting to {}...", SERVICE_NAME));

        let account = service
            .authenticate_with_token(token)
            .await
            .context("Dropbox login failed")?;

        if output.is_json() {
            fmt.print_json(&serde_json::json!({
                "success": true,
                "account_id": account.account_id,
                "name": account.name,
                "sync_directory": root,
            }));
        } else {
            fmt.success(&format!("Signed in as {}", account.name));
            fmt.info(&format!("Account: {}", account.account_id));
            fmt.info(&format!("Sync directory: {}", root));
        }
        Ok(())
    }

    async fn execute_logout(
        &self,
        config_path: &Path,
        fmt: &dyn OutputFormatter,
        output: OutputOptions,
    ) -> Result<()> {
        let service = build_service(config_path);
        service
            .deauthenticate()
            .await
            .context("Failed to clear stored credentials")?;

        if output.is_json() {
            fmt.print_json(&serde_json::json!({"success": true}));
        } else {
            fmt.success(&format!("Signed out of {}", SERVICE_NAME));
        }
        Ok(())
    }

    async fn execute_status(
        &self,
        config_path: &Path,
        fmt: &dyn OutputFormatter,
        output: OutputOptions,
    ) -> Result<()> {
        let service = build_service(config_path);

        match service.authenticate_in_background().await {
            Ok(account) => {
                if output.is_json() {
                    fmt.print_json(&serde_json::json!({
                        "authenticated": true,
                        "account_id": account.account_id,
                        "name": account.name,
                    }));
                } else {
                    fmt.success(&format!("Signed in to {}", SERVICE_NAME));
                    fmt.info(&format!("Name:    {}", account.name));
                    fmt.info(&format!("Account: {}", account.account_id));
                }
                Ok(())
            }
            Err(AuthenticationError::NoSavedCredentials) => {
                if output.is_json() {
                    fmt.print_json(&serde_json::json!({"authenticated": false}));
                } else {
                    fmt.warn("Not signed in");
                    fmt.info("Run 'harmony auth login --token <TOKEN>' to sign in.");
                }
                Ok(())
            }
            Err(e) => {
                if output.is_json() {
                    fmt.print_json(&serde_json::json!({
                        "authenticated": false,
                        "error": e.to_string(),
                    }));
                } else {
                    fmt.error(&format!("Saved session is no longer valid: {}", e));
                }
                Ok(())
            }
        }
    }
}
