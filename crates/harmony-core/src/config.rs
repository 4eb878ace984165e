//! Configuration module for Harmony.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default Dropbox RPC endpoint host.
pub const DEFAULT_API_BASE_URL: &str = "https://api.dropboxapi.com";

/// Default Dropbox content endpoint host.
pub const DEFAULT_CONTENT_BASE_URL: &str = "https://content.dropboxapi.com";

/// Largest revision page the backend will return.
pub const MAX_VERSION_LIMIT: u32 = 100;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Harmony.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dropbox: DropboxConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Dropbox backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DropboxConfig {
    /// Name of the remote root directory holding synced objects.
    pub directory_name: Option<String>,
    /// Base URL for RPC endpoints (overridable for testing).
    pub api_base_url: String,
    /// Base URL for content upload/download endpoints.
    pub content_base_url: String,
    /// Name given to the metadata template when it is first created.
    pub template_name: String,
    /// Description given to the metadata template when it is first created.
    pub template_description: String,
}

/// Change enumeration and history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Abort an enumeration after this many pages. `None` means unbounded.
    pub max_pages: Option<u32>,
    /// Number of revisions requested when listing versions.
    pub version_limit: u32,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/harmony/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("harmony")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for DropboxConfig {
    fn default() -> Self {
        Self {
            directory_name: Some("Harmony".to_string()),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            content_base_url: DEFAULT_CONTENT_BASE_URL.to_string(),
            template_name: "Harmony".to_string(),
            template_description: "Harmony syncing metadata.".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_pages: None,
            version_limit: MAX_VERSION_LIMIT,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValidationError {
    /// Dotted path to the offending field, e.g. `"sync.version_limit"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        // --- dropbox ---
        match self.dropbox.directory_name.as_deref() {
            Some(name) if name.is_empty() || name.contains('/') => {
                errors.push(ConfigValidationError {
                    field: "dropbox.directory_name".into(),
                    message: format!("must be a single non-empty path component, got '{name}'"),
                });
            }
            _ => {}
        }
        for (field, url) in [
            ("dropbox.api_base_url", &self.dropbox.api_base_url),
            ("dropbox.content_base_url", &self.dropbox.content_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ConfigValidationError {
                    field: field.into(),
                    message: format!("must be an http(s) URL, got '{url}'"),
                });
            }
        }
        if self.dropbox.template_name.is_empty() {
            errors.push(ConfigValidationError {
                field: "dropbox.template_name".into(),
                message: "must not be empty".into(),
            });
        }

        // --- sync ---
        if self.sync.max_pages == Some(0) {
            errors.push(ConfigValidationError {
                field: "sync.max_pages".into(),
                message: "must be greater than 0 when set".into(),
            });
        }
        if self.sync.version_limit == 0 || self.sync.version_limit > MAX_VERSION_LIMIT {
            errors.push(ConfigValidationError {
                field: "sync.version_limit".into(),
                message: format!("must be in range 1..={MAX_VERSION_LIMIT}"),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ConfigValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use harmony_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .dropbox_directory_name("Delta")
///     .sync_max_pages(500)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Start from default configuration values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // -- dropbox --

    pub fn dropbox_directory_name(mut self, name: impl Into<String>) -> Self {
        self.config.dropbox.directory_name = Some(name.into());
        self
    }

    pub fn dropbox_no_directory_name(mut self) -> Self {
        self.config.dropbox.directory_name = None;
        self
    }

    /// Point both RPC and content endpoints at the same host (mock servers).
    pub fn dropbox_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.config.dropbox.api_base_url = url.clone();
        self.config.dropbox.content_base_url = url;
        self
    }

    pub fn dropbox_template_name(mut self, name: impl Into<String>) -> Self {
        self.config.dropbox.template_name = name.into();
        self
    }

    // -- sync --

    pub fn sync_max_pages(mut self, pages: u32) -> Self {
        self.config.sync.max_pages = Some(pages);
        self
    }

    pub fn sync_version_limit(mut self, limit: u32) -> Self {
        self.config.sync.version_limit = limit;
        self
    }

    // -- logging --

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Consume the builder and return the configuration.
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ConfigValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
