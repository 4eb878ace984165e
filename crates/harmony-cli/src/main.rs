//! Harmony CLI - Command-line interface for the Harmony Dropbox adapter
//!
//! Provides commands for:
//! - Signing in and out of Dropbox
//! - Listing remote changes
//! - Inspecting and negotiating the metadata template
//! - Listing object revisions and deleting remote objects
//! - Viewing and validating configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use harmony_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    auth::AuthCommand, changes::ChangesCommand, config::ConfigCommand, delete::DeleteCommand,
    schema::SchemaCommand, versions::VersionsCommand,
};
use output::{OutputFormat, OutputOptions};

#[derive(Debug, Parser)]
#[command(name = "harmony", version, about = "Harmony sync adapter for Dropbox")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// List remote changes
    Changes(ChangesCommand),
    /// Inspect the metadata template
    #[command(subcommand)]
    Schema(SchemaCommand),
    /// List revisions of a remote object
    Versions(VersionsCommand),
    /// Delete a remote object
    Delete(DeleteCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = commands::config_path(cli.config.as_deref());

    // Setup tracing
    let filter = match cli.verbose {
        0 => Config::load_or_default(&config_path).logging.level,
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output = OutputOptions {
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Auth(cmd) => cmd.execute(output, &config_path).await,
        Commands::Changes(cmd) => cmd.execute(output, &config_path).await,
        Commands::Schema(cmd) => cmd.execute(output, &config_path).await,
        Commands::Versions(cmd) => cmd.execute(output, &config_path).await,
        Commands::Delete(cmd) => cmd.execute(output, &config_path).await,
        Commands::Config(cmd) => cmd.execute(output, &config_path).await,
    }
}
