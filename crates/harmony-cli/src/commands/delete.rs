//! Delete command - remove a remote object

use std::path::Path;

use anyhow::Result;
use clap::Args;
use harmony_core::domain::ServiceError;

use super::{connect, resolve_remote_path};
use crate::output::OutputOptions;

#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Remote path, or an object name inside the sync directory (e.g. Game-1)
    target: String,
}

impl DeleteCommand {
    pub async fn execute(&self, output: OutputOptions, config_path: &Path) -> Result<()> {
        let fmt = output.formatter();
        let service = connect(config_path).await?;
        let path = resolve_remote_path(&service, &self.target)?;

        let result = service.delete_path(&path).await;

        if output.is_json() {
            let json = match &result {
                Ok(()) => serde_json::json!({"success": true, "path": path}),
                Err(e) => serde_json::json!({
                    "success": false,
                    "path": path,
                    "error": e.to_string(),
                }),
            };
            fmt.print_json(&json);
            return Ok(());
        }

        match result {
            Ok(()) => fmt.success(&format!("Deleted {}", path)),
            Err(ServiceError::DoesNotExist(_)) => fmt.warn(&format!("{} does not exist", path)),
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("Failed to delete {}", path)));
            }
        }
        Ok(())
    }
}
