//! Store adapter registry

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use launchpad_auth::AuthManager;
use reqwest::Client;
use tracing::{debug, warn};

use crate::client::StoreBase;
use crate::rate_limit::{RateLimitConfig, RateLimiterFactory};
use crate::retry::RetryPolicy;
use crate::stores::build_adapter;
use crate::traits::StoreAdapter;
use crate::types::{StoreCapabilities, StoreKind};

/// Settings applied to every adapter built by [`AdapterRegistry::create_with`]
#[derive(Debug, Clone, Default)]
pub struct DispatchSettings {
    /// Retry policy for every backend call
    pub retry: RetryPolicy,
    /// API roots keyed by backend id, replacing the production URLs
    pub base_urls: HashMap<String, String>,
    /// Rate limit overrides keyed by backend id
    pub rate_limits: HashMap<String, RateLimitConfig>,
    /// Per-request timeout for backend HTTP calls
    pub request_timeout: Option<Duration>,
}

/// Registry of store adapters keyed by backend id
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn StoreAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// Wire every known backend against one shared auth manager
    ///
    /// Adapters are built without credentials being present; capability
    /// lookups never authenticate.
    pub fn create_default(auth: Arc<AuthManager>) -> Self {
        Self::create_with(auth, &DispatchSettings::default())
    }

    /// Wire every known backend with the given dispatch settings
    pub fn create_with(auth: Arc<AuthManager>, settings: &DispatchSettings) -> Self {
        let mut limiters = RateLimiterFactory::new(auth.clock());
        for (backend_id, config) in &settings.rate_limits {
            limiters = limiters.with_override(backend_id.clone(), *config);
        }

        let http = http_client(settings.request_timeout);

        let mut registry = Self::new();
        for kind in StoreKind::ALL {
            let mut base = StoreBase::new(kind, auth.clone(), limiters.limiter(kind.id()))
                .with_http_client(http.clone())
                .with_retry_policy(settings.retry);
            if let Some(url) = settings.base_urls.get(kind.id()) {
                base = base.with_base_url(url.clone());
            }
            registry.register(build_adapter(base));
        }

        debug!(count = registry.adapters.len(), "Created adapter registry");
        registry
    }

    /// Register an adapter, replacing any adapter with the same id
    pub fn register(&mut self, adapter: Arc<dyn StoreAdapter>) {
        self.adapters.insert(adapter.id().to_string(), adapter);
    }

    /// Get adapter by backend id
    pub fn get_adapter(&self, id: &str) -> Option<Arc<dyn StoreAdapter>> {
        let result = self.adapters.get(id).cloned();
        debug!(backend = id, found = result.is_some(), "Looking up store adapter");
        result
    }

    /// Capability descriptor for a backend, without authenticating
    pub fn get_capabilities(&self, id: &str) -> Option<StoreCapabilities> {
        self.adapters.get(id).map(|a| a.capabilities().clone())
    }

    /// Every registered capability descriptor, ordered by backend id
    pub fn get_all_capabilities(&self) -> Vec<StoreCapabilities> {
        self.adapters
            .values()
            .map(|a| a.capabilities().clone())
            .collect()
    }

    /// Ids of all registered backends
    pub fn get_supported_stores(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn http_client(timeout: Option<Duration>) -> Client {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build configured HTTP client, using defaults");
        Client::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationResult;
    use crate::types::*;

    struct MockStore {
        capabilities: StoreCapabilities,
    }

    impl MockStore {
        fn new(id: &str) -> Self {
            let mut capabilities = StoreKind::Firebase.capabilities();
            capabilities.store_id = id.to_string();
            capabilities.display_name = format!("Mock {}", id);
            Self { capabilities }
        }
    }

    #[async_trait::async_trait]
    impl StoreAdapter for MockStore {
        fn id(&self) -> &str {
            &self.capabilities.store_id
        }

        fn kind(&self) -> StoreKind {
            StoreKind::Firebase
        }

        fn capabilities(&self) -> &StoreCapabilities {
            &self.capabilities
        }

        async fn authenticate(&self) -> OperationResult<()> {
            unimplemented!()
        }

        async fn upload_build(&self, _request: &UploadRequest) -> OperationResult<Support<UploadResult>> {
            unimplemented!()
        }

        async fn create_release(&self, _request: &ReleaseRequest) -> OperationResult<Support<ReleaseResult>> {
            unimplemented!()
        }

        async fn update_listing(&self, _request: &ListingUpdate) -> OperationResult<Support<ActionResult>> {
            unimplemented!()
        }

        async fn get_listing(&self, _query: &ListingQuery) -> OperationResult<Support<Listing>> {
            unimplemented!()
        }

        async fn promote_release(&self, _request: &PromoteRequest) -> OperationResult<Support<ReleaseResult>> {
            unimplemented!()
        }

        async fn set_rollout(&self, _request: &RolloutRequest) -> OperationResult<Support<ReleaseResult>> {
            unimplemented!()
        }

        async fn resume_release(&self, _release: &ReleaseRef) -> OperationResult<Support<ReleaseResult>> {
            unimplemented!()
        }

        async fn submit_for_review(&self, _release: &ReleaseRef) -> OperationResult<Support<ActionResult>> {
            unimplemented!()
        }

        async fn get_status(&self, _release: &ReleaseRef) -> OperationResult<Support<StatusReport>> {
            unimplemented!()
        }

        async fn get_analytics(&self, _query: &AnalyticsQuery) -> OperationResult<Support<AnalyticsReport>> {
            unimplemented!()
        }

        async fn get_reviews(&self, _query: &ReviewQuery) -> OperationResult<Support<ReviewsPage>> {
            unimplemented!()
        }

        async fn rollback(&self, _release: &ReleaseRef) -> OperationResult<Support<ActionResult>> {
            unimplemented!()
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = AdapterRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get_adapter("anything").is_none());
        assert!(registry.get_capabilities("anything").is_none());
        assert!(registry.get_all_capabilities().is_empty());
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(MockStore::new("beta")));
        registry.register(Arc::new(MockStore::new("alpha")));

        assert_eq!(registry.len(), 2);
        assert!(registry.get_adapter("alpha").is_some());
        assert!(registry.get_adapter("gamma").is_none());
        assert_eq!(registry.get_supported_stores(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_register_replaces_same_id() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(MockStore::new("alpha")));
        registry.register(Arc::new(MockStore::new("alpha")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_default_registry_wires_every_store() {
        let registry = AdapterRegistry::create_default(Arc::new(AuthManager::new()));

        assert_eq!(registry.len(), StoreKind::ALL.len());
        assert_eq!(registry.get_all_capabilities().len(), StoreKind::ALL.len());
        assert!(registry.get_adapter("unregistered").is_none());

        for kind in StoreKind::ALL {
            let adapter = registry.get_adapter(kind.id()).unwrap();
            assert_eq!(adapter.kind(), kind);
            let caps = registry.get_capabilities(kind.id()).unwrap();
            assert_eq!(caps.auth_method, kind.auth_method());
        }
    }

    #[test]
    fn test_rate_limit_override_is_reported_in_capabilities() {
        let mut settings = DispatchSettings::default();
        settings
            .rate_limits
            .insert("vivo".to_string(), RateLimitConfig::new(2.0, 0.25));

        let registry = AdapterRegistry::create_with(Arc::new(AuthManager::new()), &settings);
        let caps = registry.get_capabilities("vivo").unwrap();
        assert_eq!(caps.rate_limit, RateLimitConfig::new(2.0, 0.25));

        let apple = registry.get_capabilities("apple").unwrap();
        assert_eq!(apple.rate_limit, StoreKind::Apple.default_rate_limit());
    }
}
