//! Launchpad Core - configuration and process context
//!
//! This crate loads the Launchpad configuration file (store credentials,
//! dispatch settings, rate limit and base URL overrides) and turns it into a
//! [`Context`]: the one shared [`launchpad_auth::AuthManager`] and
//! [`launchpad_stores::AdapterRegistry`] used for the life of the process.

pub mod config;
pub mod context;
pub mod error;

pub use config::{
    find_config, load_config, load_config_from_dir, load_config_or_default, Config,
    DispatchConfig, StoreEntry,
};
pub use context::Context;
pub use error::{ConfigError, CoreError, Result};
