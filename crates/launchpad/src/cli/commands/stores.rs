//! Stores command - capability discovery

use clap::Args;
use console::style;
use tracing::info;

use launchpad_stores::StoreCapabilities;

use crate::cli::{output, Cli, OutputFormat};

/// List supported stores and their capabilities
#[derive(Debug, Args)]
pub struct StoresCommand {
    /// Show a single store
    pub store: Option<String>,
}

impl StoresCommand {
    /// Execute the stores command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(store = ?self.store, "executing stores command");
        let rt = tokio::runtime::Runtime::new()?;
        let context = rt.block_on(cli.context())?;
        let configured = context.configured_stores();

        let capabilities: Vec<StoreCapabilities> = match &self.store {
            Some(id) => vec![context
                .registry()
                .get_capabilities(id)
                .ok_or_else(|| anyhow::anyhow!("Unknown store '{}'", id))?],
            None => context.capabilities(),
        };

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&capabilities)?);
            return Ok(());
        }

        for caps in &capabilities {
            let marker = if configured.contains(&caps.store_id) {
                style("configured").green().to_string()
            } else {
                style("not configured").dim().to_string()
            };
            println!(
                "{} ({}) {}",
                output::header(&caps.display_name),
                output::id_style().apply_to(&caps.store_id),
                marker
            );

            if cli.quiet {
                continue;
            }

            let operations: Vec<&str> = caps.operations.iter().map(|op| op.as_str()).collect();
            println!(
                "{}",
                output::key_value("auth", &caps.auth_method.credential_type().to_string())
            );
            println!("{}", output::key_value("file types", &caps.file_types.join(", ")));
            println!("{}", output::key_value("operations", &operations.join(", ")));
            println!(
                "{}",
                output::key_value("max upload", &format_bytes(caps.max_upload_bytes))
            );
            println!(
                "{}",
                output::key_value(
                    "rate limit",
                    &format!(
                        "{} burst, {}/s",
                        caps.rate_limit.capacity, caps.rate_limit.refill_rate
                    )
                )
            );
            if caps.requires_icp {
                println!("{}", output::key_value("ICP filing", "required"));
            }
            println!();
        }

        Ok(())
    }
}

fn format_bytes(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    if bytes >= GIB && bytes % GIB == 0 {
        format!("{} GiB", bytes / GIB)
    } else {
        format!("{} MiB", bytes / MIB)
    }
}
