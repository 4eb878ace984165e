//! Config command - View and manage Harmony configuration
//!
//! Provides the `harmony config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use harmony_core::config::Config;
use tracing::info;

use crate::output::OutputOptions;

const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("dropbox.directory_name", "Remote sync directory (empty to unset)"),
    ("dropbox.api_base_url", "RPC endpoint base URL"),
    ("dropbox.content_base_url", "Content endpoint base URL"),
    ("dropbox.template_name", "Name for a newly created template"),
    ("dropbox.template_description", "Description for a newly created template"),
    ("sync.max_pages", "Listing page ceiling (empty for unbounded)"),
    ("sync.version_limit", "Revisions listed per object (1-100)"),
    ("logging.level", "trace|debug|info|warn|error"),
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.max_pages")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, output: OutputOptions, config_path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(output, config_path),
            ConfigCommand::Set { key, value } => {
                self.execute_set(key, value, output, config_path)
            }
            ConfigCommand::Validate => self.execute_validate(output, config_path),
        }
    }

    fn execute_show(&self, output: OutputOptions, config_path: &Path) -> Result<()> {
        let formatter = output.formatter();
        let config = Config::load_or_default(config_path);

        info!(config_path = %config_path.display(), "Showing configuration");

        if output.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    fn execute_set(
        &self,
        key: &str,
        value: &str,
        output: OutputOptions,
        config_path: &Path,
    ) -> Result<()> {
        let formatter = output.formatter();
        let mut config = Config::load_or_default(config_path);

        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if output.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, help) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {:<30} - {}", name, help));
                }
            }
            return Err(e.context(format!("Failed to set '{}'", key)));
        }

        let errors = config.validate();
        if !errors.is_empty() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            if output.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": messages,
                }));
            } else {
                formatter.error(&format!(
                    "Invalid value for '{}': {}",
                    key,
                    messages.join("; ")
                ));
            }
            anyhow::bail!("Invalid value for '{}': {}", key, messages.join("; "));
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

        if output.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {} = {}", key, value));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, output: OutputOptions, config_path: &Path) -> Result<()> {
        let formatter = output.formatter();

        let config = match Config::load(config_path) {
            Ok(config) => config,
            Err(_) if !config_path.exists() => {
                if output.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": ["Configuration file not found. Using defaults."],
                    }));
                } else {
                    formatter.info(&format!(
                        "Configuration file not found at {}",
                        config_path.display()
                    ));
                    formatter.info(
                        "Using default configuration. Run 'harmony config set <key> <value>' to create one.",
                    );
                }
                return Ok(());
            }
            Err(e) => {
                if output.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {}", e)],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {}", e));
                    formatter.info(&format!("File: {}", config_path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");
        let errors = config.validate();

        if output.is_json() {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": messages,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- dropbox ---
        "dropbox.directory_name" => config.dropbox.directory_name = optional(value),
        "dropbox.api_base_url" => config.dropbox.api_base_url = value.to_string(),
        "dropbox.content_base_url" => config.dropbox.content_base_url = value.to_string(),
        "dropbox.template_name" => config.dropbox.template_name = value.to_string(),
        "dropbox.template_description" => {
            config.dropbox.template_description = value.to_string();
        }

        // --- sync ---
        "sync.max_pages" => {
            config.sync.max_pages = optional(value)
                .map(|v| v.parse::<u32>())
                .transpose()
                .context("Expected a positive integer for sync.max_pages")?;
        }
        "sync.version_limit" => {
            config.sync.version_limit = value
                .parse::<u32>()
                .context("Expected a positive integer for sync.version_limit")?;
        }

        // --- logging ---
        "logging.level" => config.logging.level = value.to_lowercase(),

        _ => anyhow::bail!("Unknown configuration key '{}'", key),
    }
    Ok(())
}
