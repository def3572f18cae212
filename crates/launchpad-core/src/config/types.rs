//! Configuration types

use launchpad_auth::{AuthCredentials, CredentialType};
use launchpad_stores::{DispatchSettings, RateLimitConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for Launchpad
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Version of the config schema
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Project name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Credential descriptors keyed by store id
    pub stores: BTreeMap<String, StoreEntry>,

    /// Retry and timeout settings shared by every store
    pub dispatch: DispatchConfig,

    /// Rate limit overrides keyed by store id
    pub rate_limits: BTreeMap<String, RateLimitConfig>,

    /// API root overrides keyed by store id
    pub base_urls: BTreeMap<String, String>,
}

impl Config {
    /// Ids of stores that are configured and enabled
    pub fn enabled_stores(&self) -> Vec<&str> {
        self.stores
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Dispatch settings for the adapter registry
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            retry: self.dispatch.retry_policy(),
            base_urls: self
                .base_urls
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            rate_limits: self
                .rate_limits
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            request_timeout: self.dispatch.request_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Credentials for one store
///
/// Either an inline descriptor (`type`, `file_path`, `config`) or a
/// `credentials_file` holding the descriptor as JSON or TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEntry {
    /// Whether the store is wired into the context
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Protocol family of the inline descriptor
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<CredentialType>,

    /// Key or service-account file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Family-specific settings
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, String>,

    /// External credential descriptor file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,
}

impl StoreEntry {
    /// Inline descriptor with the given family
    pub fn new(credential_type: CredentialType) -> Self {
        Self {
            enabled: true,
            credential_type: Some(credential_type),
            file_path: None,
            config: HashMap::new(),
            credentials_file: None,
        }
    }

    /// Entry that defers to a descriptor file
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            credential_type: None,
            file_path: None,
            config: HashMap::new(),
            credentials_file: Some(path.into()),
        }
    }

    /// Add a config value
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    /// Inline credential descriptor, if the entry has one
    pub fn credentials(&self) -> Option<AuthCredentials> {
        self.credential_type.map(|credential_type| AuthCredentials {
            credential_type,
            file_path: self.file_path.clone(),
            config: self.config.clone(),
        })
    }
}

fn default_true() -> bool {
    true
}

/// Retry and timeout settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry, doubled for each further retry
    pub base_delay_ms: u64,

    /// Per-request timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            request_timeout_secs: None,
        }
    }
}

impl DispatchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dispatch_matches_retry_policy() {
        let config = Config::default();
        assert_eq!(config.dispatch.retry_policy(), RetryPolicy::default());
        assert!(config.stores.is_empty());
    }

    #[test]
    fn test_parse_store_entries() {
        let config: Config = toml::from_str(
            r#"
            [stores.firebase]
            type = "apikey"
            config = { api_key = "AIza" }

            [stores.vivo]
            enabled = false
            type = "hmac"
            config = { secret = "s", access_key = "ak" }

            [stores.google-play]
            credentials_file = "keys/play.json"
            "#,
        )
        .unwrap();

        let firebase = config.stores["firebase"].credentials().unwrap();
        assert_eq!(firebase.credential_type, CredentialType::ApiKey);
        assert_eq!(firebase.get("api_key"), Some("AIza"));

        assert!(config.stores["google-play"].credentials().is_none());
        assert_eq!(config.enabled_stores(), vec!["firebase", "google-play"]);
    }

    #[test]
    fn test_dispatch_settings_conversion() {
        let mut config = Config::default();
        config.dispatch.max_retries = 5;
        config.dispatch.request_timeout_secs = Some(30);
        config
            .rate_limits
            .insert("huawei".to_string(), RateLimitConfig::new(4.0, 1.0));
        config
            .base_urls
            .insert("apple".to_string(), "http://localhost:9000".to_string());

        let settings = config.dispatch_settings();
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.rate_limits["huawei"], RateLimitConfig::new(4.0, 1.0));
        assert_eq!(settings.base_urls["apple"], "http://localhost:9000");
    }
}
