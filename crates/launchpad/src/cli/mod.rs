//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use launchpad_core::Context;
use tracing::debug;

use commands::{AuthCommand, CheckCommand, InitCommand, StoresCommand};

/// Launchpad - multi-store publishing diagnostics
#[derive(Debug, Parser)]
#[command(name = "launchpad")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Configuration file (skips discovery)
    #[arg(short, long, global = true, env = "LAUNCHPAD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a starter configuration file
    Init(InitCommand),

    /// List supported stores and their capabilities
    Stores(StoresCommand),

    /// Authenticate against one store
    Auth(AuthCommand),

    /// Authenticate every configured store
    Check(CheckCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Stores(ref cmd) => cmd.execute(&self),
            Commands::Auth(ref cmd) => cmd.execute(&self),
            Commands::Check(ref cmd) => cmd.execute(&self),
        }
    }

    /// Build the process context from `--config` or by discovery
    pub async fn context(&self) -> anyhow::Result<Context> {
        let context = match &self.config {
            Some(path) => Context::from_path(path).await?,
            None => Context::discover(&std::env::current_dir()?).await?,
        };
        debug!(config = ?context.config_path(), "loaded context");
        Ok(context)
    }
}
