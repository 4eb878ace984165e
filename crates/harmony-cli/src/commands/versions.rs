//! Versions command - list revisions of a remote object

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use tracing::info;

use super::{connect, resolve_remote_path};
use crate::output::OutputOptions;

#[derive(Debug, Args)]
pub struct VersionsCommand {
    /// Remote path, or an object name inside the sync directory (e.g. Game-1)
    target: String,
}

impl VersionsCommand {
    pub async fn execute(&self, output: OutputOptions, config_path: &Path) -> Result<()> {
        let fmt = output.formatter();
        let service = connect(config_path).await?;
        let path = resolve_remote_path(&service, &self.target)?;

        info!(path = %path, "Listing revisions");
        let versions = service
            .list_versions(&path)
            .await
            .with_context(|| format!("Failed to list revisions of {}", path))?;

        if output.is_json() {
            let entries: Vec<serde_json::Value> = versions
                .iter()
                .map(|v| {
                    serde_json::json!({
                        "identifier": v.identifier,
                        "date": v.date.to_rfc3339(),
                    })
                })
                .collect();
            fmt.print_json(&serde_json::json!({
                "path": path,
                "versions": entries,
            }));
            return Ok(());
        }

        fmt.success(&format!(
            "{} revision{} of {}",
            versions.len(),
            if versions.len() == 1 { "" } else { "s" },
            path
        ));
        for version in &versions {
            fmt.info(&format!(
                "{}  {}",
                version.identifier,
                version.date.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            ));
        }
        Ok(())
    }
}
