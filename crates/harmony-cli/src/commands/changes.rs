//! Changes command - list remote records, fully or since a change token

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use harmony_core::domain::{ChangeToken, RemoteRecord};
use tracing::info;

use super::connect;
use crate::output::OutputOptions;

#[derive(Debug, Args)]
pub struct ChangesCommand {
    /// Change token from a previous run; lists everything when omitted
    #[arg(long)]
    token: Option<String>,
}

impl ChangesCommand {
    pub async fn execute(&self, output: OutputOptions, config_path: &Path) -> Result<()> {
        let fmt = output.formatter();
        let service = connect(config_path).await?;

        let resume_from = self
            .token
            .as_ref()
            .map(|token| ChangeToken::from(token.clone().into_bytes()));
        info!(incremental = resume_from.is_some(), "Listing remote changes");

        let changes = service
            .fetch_changes(resume_from)
            .await
            .context("Failed to list remote changes")?;

        let mut updated: Vec<&RemoteRecord> = changes.updated.iter().collect();
        updated.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        let mut deleted: Vec<&String> = changes.deleted.iter().collect();
        deleted.sort();
        let token = String::from_utf8_lossy(changes.change_token.as_bytes()).into_owned();

        if output.is_json() {
            let records: Vec<serde_json::Value> = updated.iter().map(|r| record_json(r)).collect();
            fmt.print_json(&serde_json::json!({
                "updated": records,
                "deleted": deleted,
                "change_token": token,
            }));
            return Ok(());
        }

        fmt.success(&format!(
            "{} updated, {} deleted",
            updated.len(),
            deleted.len()
        ));
        for record in &updated {
            fmt.info(&format!(
                "~ {}  rev {}  {}",
                record.identifier(),
                record.version().identifier,
                record.version().date.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        for identifier in &deleted {
            fmt.info(&format!("- {}", identifier));
        }
        fmt.info("");
        fmt.info(&format!("Change token: {}", token));
        Ok(())
    }
}

fn record_json(record: &RemoteRecord) -> serde_json::Value {
    let metadata: serde_json::Map<String, serde_json::Value> = record
        .metadata()
        .iter()
        .map(|(key, value)| (key.to_string(), serde_json::Value::from(value)))
        .collect();

    serde_json::json!({
        "identifier": record.identifier(),
        "version": record.version().identifier,
        "date": record.version().date.to_rfc3339(),
        "status": format!("{:?}", record.status()),
        "metadata": metadata,
    })
}
