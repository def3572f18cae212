//! Check command - authenticate every configured store

use clap::Args;
use serde::Serialize;
use tracing::info;

use crate::cli::{output, Cli, OutputFormat};

use super::auth::AuthOutcome;
use super::print_failure;

/// Authenticate every configured store
#[derive(Debug, Args)]
pub struct CheckCommand {
    /// Only check these stores
    #[arg(long, value_delimiter = ',')]
    pub only: Option<Vec<String>>,
}

/// Summary of all checks
#[derive(Debug, Serialize)]
pub struct CheckSummary {
    pub results: Vec<AuthOutcome>,
    pub ok_count: usize,
    pub fail_count: usize,
}

impl CheckCommand {
    /// Execute the check command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(only = ?self.only, "executing check command");
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run(cli))
    }

    async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let context = cli.context().await?;

        let stores: Vec<String> = context
            .configured_stores()
            .into_iter()
            .filter(|id| self.only.as_ref().map_or(true, |only| only.contains(id)))
            .collect();

        if stores.is_empty() {
            if cli.format == OutputFormat::Json {
                let summary = CheckSummary {
                    results: Vec::new(),
                    ok_count: 0,
                    fail_count: 0,
                };
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else if !cli.quiet {
                output::warning("No stores configured. Run `launchpad init` to create a configuration.");
            }
            return Ok(());
        }

        let mut results = Vec::with_capacity(stores.len());
        for id in stores {
            let adapter = context.adapter(&id)?;
            let outcome = match adapter.authenticate().await {
                Ok(()) => AuthOutcome {
                    store_id: id,
                    success: true,
                    error: None,
                },
                Err(err) => AuthOutcome {
                    store_id: id,
                    success: false,
                    error: Some(err),
                },
            };

            if cli.format == OutputFormat::Text {
                match &outcome.error {
                    None if !cli.quiet => output::success(&outcome.store_id),
                    None => {}
                    Some(err) => print_failure(&outcome.store_id, err, cli.verbose),
                }
            }
            results.push(outcome);
        }

        let ok_count = results.iter().filter(|r| r.success).count();
        let summary = CheckSummary {
            fail_count: results.len() - ok_count,
            ok_count,
            results,
        };

        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            OutputFormat::Text if !cli.quiet => {
                println!();
                println!(
                    "{}",
                    output::header(&format!(
                        "{} passed, {} failed",
                        summary.ok_count, summary.fail_count
                    ))
                );
            }
            OutputFormat::Text => {}
        }

        if summary.fail_count > 0 {
            anyhow::bail!("{} store(s) failed authentication", summary.fail_count);
        }
        Ok(())
    }
}
