//! Process-wide context
//!
//! A [`Context`] is built once at startup from the loaded [`Config`] and
//! passed by reference to everything that dispatches store operations. It
//! owns the shared [`AuthManager`] and the [`AdapterRegistry`] wired against
//! it; dropping it releases both.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use launchpad_auth::AuthManager;
use launchpad_stores::{AdapterRegistry, StoreAdapter, StoreCapabilities};
use tracing::{debug, info};

use crate::config::{load_config, load_config_or_default, Config};
use crate::error::{CoreError, Result};

/// Shared auth manager and adapter registry for one process
pub struct Context {
    config: Config,
    config_path: Option<PathBuf>,
    auth: Arc<AuthManager>,
    registry: AdapterRegistry,
}

impl Context {
    /// Build a context with a fresh auth manager
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_auth(config, Arc::new(AuthManager::new())).await
    }

    /// Build a context around an existing auth manager
    ///
    /// Credentials for every enabled store are registered before the
    /// adapters are wired.
    pub async fn with_auth(config: Config, auth: Arc<AuthManager>) -> Result<Self> {
        for (id, entry) in &config.stores {
            if !entry.enabled {
                debug!(store = %id, "store disabled, skipping credentials");
                continue;
            }

            if let Some(path) = &entry.credentials_file {
                auth.load_credentials(id, path).await?;
            } else if let Some(credentials) = entry.credentials() {
                auth.set_credentials(id, credentials);
            }
        }

        let registry = AdapterRegistry::create_with(auth.clone(), &config.dispatch_settings());
        info!(
            stores = registry.len(),
            configured = auth.configured_backends().len(),
            "context ready"
        );

        Ok(Self {
            config,
            config_path: None,
            auth,
            registry,
        })
    }

    /// Load the config at `path` and build a context from it
    pub async fn from_path(path: &Path) -> Result<Self> {
        let config = load_config(path)?;
        let mut context = Self::new(config).await?;
        context.config_path = Some(path.to_path_buf());
        Ok(context)
    }

    /// Discover a config from `dir` upwards, falling back to defaults
    pub async fn discover(dir: &Path) -> Result<Self> {
        let (config, config_path) = load_config_or_default(dir)?;
        let mut context = Self::new(config).await?;
        context.config_path = config_path;
        Ok(context)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// File the config was loaded from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Adapter for a store id
    pub fn adapter(&self, id: &str) -> Result<Arc<dyn StoreAdapter>> {
        self.registry
            .get_adapter(id)
            .ok_or_else(|| CoreError::UnknownStore(id.to_string()))
    }

    /// Capability descriptors of every wired store
    pub fn capabilities(&self) -> Vec<StoreCapabilities> {
        self.registry.get_all_capabilities()
    }

    /// Ids of stores with registered credentials
    pub fn configured_stores(&self) -> Vec<String> {
        self.auth.configured_backends()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config_path", &self.config_path)
            .field("stores", &self.registry.get_supported_stores())
            .field("configured", &self.configured_stores())
            .finish()
    }
}
