//! Schema commands - inspect and extend the metadata template

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use harmony_core::domain::MetadataKey;
use harmony_dropbox::schema::PropertyTemplate;

use super::connect;
use crate::output::{OutputFormatter, OutputOptions};

#[derive(Debug, Subcommand)]
pub enum SchemaCommand {
    /// Show the template, declaring every known key first
    Show,
    /// Make sure the template declares the given keys
    Ensure {
        /// Wire names of the keys (e.g. harmony_sha1Hash)
        #[arg(required = true)]
        keys: Vec<MetadataKey>,
    },
}

impl SchemaCommand {
    pub async fn execute(&self, output: OutputOptions, config_path: &Path) -> Result<()> {
        let fmt = output.formatter();
        let service = connect(config_path).await?;

        let keys = match self {
            SchemaCommand::Show => MetadataKey::ALL.to_vec(),
            SchemaCommand::Ensure { keys } => keys.clone(),
        };
        let template = service
            .ensure_schema(keys)
            .await
            .context("Failed to negotiate the metadata template")?;

        print_template(&template, &*fmt, output);
        Ok(())
    }
}

fn print_template(template: &PropertyTemplate, fmt: &dyn OutputFormatter, output: OutputOptions) {
    if output.is_json() {
        fmt.print_json(&template_json(template));
        return;
    }

    fmt.success(&format!("Template {} ({})", template.name, template.id));
    if !template.description.is_empty() {
        fmt.info(&template.description);
    }
    fmt.info("");
    let mut names: Vec<&str> = template.field_names().into_iter().collect();
    names.sort_unstable();
    for name in names {
        let marker = if name.parse::<MetadataKey>().is_ok() {
            " "
        } else {
            "?"
        };
        fmt.info(&format!("{} {}", marker, name));
    }
}

fn template_json(template: &PropertyTemplate) -> serde_json::Value {
    serde_json::json!({
        "id": template.id,
        "name": template.name,
        "description": template.description,
        "fields": template.fields,
    })
}
