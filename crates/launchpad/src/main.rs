//! Launchpad - multi-store publishing diagnostics CLI

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use cli::Cli;

/// Console filter override, checked before RUST_LOG
const LOG_ENV_VAR: &str = "LAUNCHPAD_LOG";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli);

    cli.execute()
}

/// Console filter directive implied by the verbosity flags
fn console_directive(verbose: bool, quiet: bool) -> &'static str {
    match (verbose, quiet) {
        (_, true) => "error",
        (true, false) => "warn,launchpad=debug,launchpad_core=debug,launchpad_auth=debug,launchpad_stores=debug",
        (false, false) => "warn",
    }
}

/// Set up tracing with two layers:
/// - Console: LAUNCHPAD_LOG, then RUST_LOG, then the verbosity flags
/// - File: always debug-level JSON to ~/.launchpad/logs/, keyed by store id
fn init_tracing(cli: &Cli) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let console_filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(console_directive(cli.verbose, cli.quiet)));

    if let Some(log_dir) = log_directory() {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "launchpad.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_filter(console_filter),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_filter(EnvFilter::new(
                        "debug,reqwest=info,hyper=info,hyper_util=info",
                    )),
            )
            .init();

        return Some(guard);
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    None
}

/// Returns the log directory path, creating it if needed.
fn log_directory() -> Option<std::path::PathBuf> {
    let log_dir = dirs::home_dir()?.join(".launchpad").join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_directive_follows_flags() {
        assert_eq!(console_directive(false, false), "warn");
        assert_eq!(console_directive(true, true), "error");
        assert!(console_directive(true, false).contains("launchpad_stores=debug"));
    }
}
