//! CLI commands

mod auth;
mod check;
mod init;
mod stores;

pub use auth::AuthCommand;
pub use check::CheckCommand;
pub use init::InitCommand;
pub use stores::StoresCommand;

use console::style;
use launchpad_stores::NormalizedError;

use crate::cli::output;

/// Print a normalized error with its suggestion
pub(crate) fn print_failure(store_id: &str, err: &NormalizedError, verbose: bool) {
    output::error(&format!("{}: {}", style(store_id).bold(), err));
    println!("{}", output::key_value("suggestion", &err.suggestion));
    if verbose {
        if let Some(status) = err.status_code {
            println!("{}", output::key_value("status", &status.to_string()));
        }
        println!("{}", output::key_value("retryable", &err.retryable.to_string()));
    }
}
