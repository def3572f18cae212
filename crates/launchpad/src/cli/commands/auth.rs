//! Auth command - authenticate against one store

use clap::Args;
use serde::Serialize;
use tracing::info;

use launchpad_stores::NormalizedError;

use crate::cli::{output, Cli, OutputFormat};

use super::print_failure;

/// Authenticate against one store
#[derive(Debug, Args)]
pub struct AuthCommand {
    /// Store id (see `launchpad stores`)
    pub store: String,
}

/// Outcome of one authentication attempt
#[derive(Debug, Serialize)]
pub struct AuthOutcome {
    pub store_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<NormalizedError>,
}

impl AuthCommand {
    /// Execute the auth command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(store = %self.store, "executing auth command");
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run(cli))
    }

    async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let context = cli.context().await?;
        let adapter = context.adapter(&self.store)?;

        let outcome = match adapter.authenticate().await {
            Ok(()) => AuthOutcome {
                store_id: self.store.clone(),
                success: true,
                error: None,
            },
            Err(err) => AuthOutcome {
                store_id: self.store.clone(),
                success: false,
                error: Some(err),
            },
        };

        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
            OutputFormat::Text => match &outcome.error {
                None if !cli.quiet => output::success(&format!(
                    "Authenticated with {}",
                    adapter.capabilities().display_name
                )),
                None => {}
                Some(err) => print_failure(&self.store, err, cli.verbose),
            },
        }

        if !outcome.success {
            anyhow::bail!("Authentication failed for '{}'", self.store);
        }
        Ok(())
    }
}
