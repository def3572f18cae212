//! Token cache and refresh orchestration
//!
//! [`AuthManager`] combines the [`CredentialStore`] with the signing primitives.
//! Bearer-token families (OAuth2, JWT, API key) are cached per backend id and
//! refreshed on demand. Signature families (RSA, HMAC) authorize each request
//! individually through [`AuthManager::sign_request`] and
//! [`AuthManager::generate_hmac_signature`].
//!
//! Concurrent cache misses for the same backend share a single refresh: the
//! first caller takes a per-backend guard, later callers wait on it and then
//! find the fresh token in the cache. Every registration bumps a per-backend
//! generation; a refresh whose credentials were replaced while it was in
//! flight is discarded and retried with the new registration.

use crate::clock::{Clock, SystemClock};
use crate::credentials::{read_key_file, AuthCredentials, CredentialStore, CredentialType};
use crate::error::{AuthError, Result};
use crate::signing;
use crate::token::CachedToken;
use parking_lot::{Mutex, RwLock};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument};

/// Default OAuth2 token endpoint for service accounts
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Default scope requested by service accounts
pub const DEFAULT_SERVICE_ACCOUNT_SCOPE: &str = "https://www.googleapis.com/auth/androidpublisher";

/// Placeholder token cached for signature-based families
pub const SIGNED_REQUEST_MARKER: &str = "signed-request";

/// Lifetime of tokens that never really expire
const LONG_LIVED_TTL_MS: i64 = 365 * 24 * 60 * 60 * 1000;

/// Service account key file contents
#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: Option<String>,
}

/// Per-backend credential and token manager
pub struct AuthManager {
    credentials: RwLock<CredentialStore>,
    tokens: RwLock<HashMap<String, CachedToken>>,
    generations: Mutex<HashMap<String, u64>>,
    refresh_guards: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    client: Client,
    clock: Arc<dyn Clock>,
}

impl AuthManager {
    /// Create a manager using the system clock and a default HTTP client
    pub fn new() -> Self {
        Self {
            credentials: RwLock::new(CredentialStore::new()),
            tokens: RwLock::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
            refresh_guards: Mutex::new(HashMap::new()),
            client: Client::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the HTTP client used for token exchanges
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// The time source shared with collaborators
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Load a credential descriptor file and register it
    pub async fn load_credentials(&self, backend_id: &str, path: &Path) -> Result<()> {
        let credentials = AuthCredentials::from_file(path).await?;
        self.set_credentials(backend_id, credentials);
        Ok(())
    }

    /// Register credentials, replacing any earlier registration
    ///
    /// A cached token for the backend is discarded, and so is the result of
    /// any refresh still running against the previous registration.
    pub fn set_credentials(&self, backend_id: &str, credentials: AuthCredentials) {
        // Lock order: tokens, credentials, generations
        let mut tokens = self.tokens.write();
        let mut store = self.credentials.write();
        store.insert(backend_id, credentials);
        *self
            .generations
            .lock()
            .entry(backend_id.to_string())
            .or_default() += 1;
        tokens.remove(backend_id);
    }

    /// Credentials registered for a backend
    pub fn credentials(&self, backend_id: &str) -> Option<AuthCredentials> {
        self.credentials.read().get(backend_id).cloned()
    }

    /// Credential family registered for a backend
    pub fn credential_type(&self, backend_id: &str) -> Option<CredentialType> {
        self.credentials
            .read()
            .get(backend_id)
            .map(|c| c.credential_type)
    }

    /// Backend ids with registered credentials
    pub fn configured_backends(&self) -> Vec<String> {
        self.credentials.read().ids()
    }

    /// Whether the cached token for a backend is still usable
    pub fn is_token_valid(&self, backend_id: &str) -> bool {
        let now = self.clock.now_ms();
        self.tokens
            .read()
            .get(backend_id)
            .is_some_and(|t| t.is_valid_at(now))
    }

    /// Drop the cached token so the next [`get_token`](Self::get_token) refreshes
    pub fn invalidate(&self, backend_id: &str) {
        if self.tokens.write().remove(backend_id).is_some() {
            debug!(backend = backend_id, "Invalidated cached token");
        }
    }

    /// Return a valid token, refreshing it when the cache is empty or stale
    pub async fn get_token(&self, backend_id: &str) -> Result<String> {
        self.require_credentials(backend_id)?;

        if let Some(token) = self.cached_token(backend_id) {
            debug!(backend = backend_id, "Token cache hit");
            return Ok(token);
        }

        let guard = self.refresh_guard(backend_id);
        let _lock = guard.lock().await;

        // Another caller may have refreshed while we waited on the guard
        if let Some(token) = self.cached_token(backend_id) {
            debug!(backend = backend_id, "Token refreshed by concurrent caller");
            return Ok(token);
        }

        self.refresh_locked(backend_id).await
    }

    /// Force acquisition of a fresh token, replacing any cached one
    pub async fn refresh_token(&self, backend_id: &str) -> Result<String> {
        self.require_credentials(backend_id)?;

        let guard = self.refresh_guard(backend_id);
        let _lock = guard.lock().await;

        self.refresh_locked(backend_id).await
    }

    /// Acquire and cache a token; the caller holds the backend's refresh guard
    async fn refresh_locked(&self, backend_id: &str) -> Result<String> {
        loop {
            let (credentials, generation) = self.registration(backend_id)?;
            let token = self.acquire(backend_id, &credentials).await?;
            if let Some(value) = self.store_if_current(backend_id, generation, token) {
                return Ok(value);
            }
            debug!(
                backend = backend_id,
                "Credentials replaced during refresh, discarding token"
            );
        }
    }

    /// Sign canonicalized request parameters with the backend's RSA key
    ///
    /// Parameters are sorted by key and joined as `k=v&k=v` before signing, so
    /// the result is independent of the order in which they are supplied.
    pub async fn sign_request<I, K, V>(
        &self,
        backend_id: &str,
        method: &str,
        uri: &str,
        params: I,
    ) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let credentials = self.require_credentials(backend_id)?;
        if credentials.credential_type != CredentialType::Rsa {
            return Err(AuthError::UnsupportedOperation {
                backend: backend_id.to_string(),
                operation: "RSA request signing".to_string(),
            });
        }

        let canonical = signing::canonicalize_params(params);
        debug!(backend = backend_id, method, uri, "Signing request parameters");

        let pem = credentials.private_key_pem(backend_id).await?;
        signing::rsa_sha256_sign(backend_id, &pem, &canonical)
    }

    /// HMAC-SHA256 of an already canonicalized message, lowercase hex
    pub fn generate_hmac_signature(&self, backend_id: &str, message: &str) -> Result<String> {
        let credentials = self.require_credentials(backend_id)?;
        if credentials.credential_type != CredentialType::Hmac {
            return Err(AuthError::UnsupportedOperation {
                backend: backend_id.to_string(),
                operation: "HMAC signing".to_string(),
            });
        }

        let secret = credentials.require(backend_id, "secret")?;
        signing::hmac_sha256_hex(backend_id, secret, message)
    }

    /// Current credentials together with their generation
    fn registration(&self, backend_id: &str) -> Result<(AuthCredentials, u64)> {
        let store = self.credentials.read();
        let credentials = store
            .get(backend_id)
            .cloned()
            .ok_or_else(|| AuthError::NoCredentials(backend_id.to_string()))?;
        let generation = self.generation(backend_id);
        Ok((credentials, generation))
    }

    fn generation(&self, backend_id: &str) -> u64 {
        self.generations
            .lock()
            .get(backend_id)
            .copied()
            .unwrap_or_default()
    }

    fn require_credentials(&self, backend_id: &str) -> Result<AuthCredentials> {
        self.credentials(backend_id)
            .ok_or_else(|| AuthError::NoCredentials(backend_id.to_string()))
    }

    fn cached_token(&self, backend_id: &str) -> Option<String> {
        let now = self.clock.now_ms();
        self.tokens
            .read()
            .get(backend_id)
            .filter(|t| t.is_valid_at(now))
            .map(|t| t.token.clone())
    }

    fn refresh_guard(&self, backend_id: &str) -> Arc<AsyncMutex<()>> {
        let mut guards = self.refresh_guards.lock();
        guards
            .entry(backend_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Cache `token` unless the backend was re-registered after `generation`
    fn store_if_current(
        &self,
        backend_id: &str,
        generation: u64,
        token: CachedToken,
    ) -> Option<String> {
        let mut tokens = self.tokens.write();
        if self.generation(backend_id) != generation {
            return None;
        }
        let value = token.token.clone();
        tokens.insert(backend_id.to_string(), token);
        Some(value)
    }

    #[instrument(skip(self, credentials), fields(credential_type = %credentials.credential_type))]
    async fn acquire(
        &self,
        backend_id: &str,
        credentials: &AuthCredentials,
    ) -> Result<CachedToken> {
        let now = self.clock.now_ms();

        let token = match credentials.credential_type {
            CredentialType::OAuth2 if credentials.is_client_credentials() => {
                self.client_credentials_token(backend_id, credentials, now)
                    .await?
            }
            CredentialType::OAuth2 => {
                self.service_account_token(backend_id, credentials, now)
                    .await?
            }
            CredentialType::Jwt => {
                let key_id = credentials.require(backend_id, "key_id")?;
                let issuer_id = credentials.require(backend_id, "issuer_id")?;
                let pem = credentials.private_key_pem(backend_id).await?;
                let jwt =
                    signing::issue_es256_jwt(backend_id, &pem, key_id, issuer_id, now / 1000)?;
                CachedToken::new(jwt, now, signing::JWT_LIFETIME_SECS * 1000)
            }
            CredentialType::ApiKey => {
                let key = credentials.require(backend_id, "api_key")?;
                CachedToken::new(key, now, LONG_LIVED_TTL_MS)
            }
            CredentialType::Rsa | CredentialType::Hmac => {
                CachedToken::new(SIGNED_REQUEST_MARKER, now, LONG_LIVED_TTL_MS)
            }
        };

        info!(
            backend = backend_id,
            expires_at = token.expires_at,
            "Acquired token"
        );
        Ok(token)
    }

    async fn client_credentials_token(
        &self,
        backend_id: &str,
        credentials: &AuthCredentials,
        now: i64,
    ) -> Result<CachedToken> {
        let token_url = credentials.require(backend_id, "token_url")?;
        let client_id = credentials.require(backend_id, "client_id")?;
        let client_secret = credentials.require(backend_id, "client_secret")?;

        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        if let Some(scope) = credentials.get("scope") {
            form.push(("scope", scope));
        }
        if let Some(resource) = credentials.get("resource") {
            form.push(("resource", resource));
        }

        let response = signing::exchange_token(&self.client, backend_id, token_url, &form).await?;
        Ok(CachedToken::new(
            response.access_token,
            now,
            response.expires_in * 1000,
        ))
    }

    async fn service_account_token(
        &self,
        backend_id: &str,
        credentials: &AuthCredentials,
        now: i64,
    ) -> Result<CachedToken> {
        let account = match (credentials.get("client_email"), credentials.get("private_key")) {
            (Some(email), Some(_)) => ServiceAccountKey {
                client_email: email.to_string(),
                private_key: credentials.private_key_pem(backend_id).await?,
                token_uri: credentials.get("token_uri").map(String::from),
            },
            _ => {
                let path = credentials
                    .file_path
                    .as_deref()
                    .ok_or_else(|| AuthError::MissingField {
                        backend: backend_id.to_string(),
                        field: "file_path".to_string(),
                    })?;
                let content = read_key_file(path).await?;
                serde_json::from_str(&content).map_err(|e| AuthError::InvalidDescriptor {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            }
        };

        let token_uri = credentials
            .get("token_uri")
            .map(String::from)
            .or(account.token_uri)
            .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string());
        let scope = credentials
            .get("scope")
            .unwrap_or(DEFAULT_SERVICE_ACCOUNT_SCOPE);

        let assertion = signing::service_account_assertion(
            backend_id,
            &account.client_email,
            &account.private_key,
            scope,
            &token_uri,
            now / 1000,
        )?;

        let form = [
            ("grant_type", signing::JWT_BEARER_GRANT),
            ("assertion", assertion.as_str()),
        ];
        let response =
            signing::exchange_token(&self.client, backend_id, &token_uri, &form).await?;

        Ok(CachedToken::new(
            response.access_token,
            now,
            response.expires_in * 1000,
        ))
    }
}

impl Default for AuthManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("backends", &self.configured_backends())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manager_at(start_ms: i64) -> (AuthManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_ms));
        let manager = AuthManager::new().with_clock(clock.clone());
        (manager, clock)
    }

    #[tokio::test]
    async fn test_unknown_backend_fails() {
        let manager = AuthManager::new();
        let err = manager.get_token("nowhere").await.unwrap_err();
        assert!(matches!(err, AuthError::NoCredentials(ref id) if id == "nowhere"));
        assert!(err.is_fatal());
        assert!(!manager.is_token_valid("nowhere"));
    }

    #[tokio::test]
    async fn test_api_key_is_returned_verbatim() {
        let (manager, clock) = manager_at(1_000_000);
        manager.set_credentials("a", AuthCredentials::api_key("k1"));

        assert_eq!(manager.get_token("a").await.unwrap(), "k1");
        assert!(manager.is_token_valid("a"));

        clock.advance_ms(364 * 24 * 60 * 60 * 1000);
        assert!(manager.is_token_valid("a"));
    }

    #[tokio::test]
    async fn test_signature_families_cache_marker() {
        let (manager, _clock) = manager_at(0);
        manager.set_credentials("vivo", AuthCredentials::hmac("secret"));

        assert_eq!(
            manager.get_token("vivo").await.unwrap(),
            SIGNED_REQUEST_MARKER
        );
        assert!(manager.is_token_valid("vivo"));
    }

    #[tokio::test]
    async fn test_set_credentials_evicts_token() {
        let (manager, _clock) = manager_at(0);
        manager.set_credentials("a", AuthCredentials::api_key("k1"));
        manager.get_token("a").await.unwrap();

        manager.set_credentials("a", AuthCredentials::api_key("k2"));
        assert!(!manager.is_token_valid("a"));
        assert_eq!(manager.get_token("a").await.unwrap(), "k2");
    }

    #[tokio::test]
    async fn test_invalidate_drops_token() {
        let (manager, _clock) = manager_at(0);
        manager.set_credentials("a", AuthCredentials::api_key("k1"));
        manager.get_token("a").await.unwrap();

        manager.invalidate("a");
        assert!(!manager.is_token_valid("a"));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_fatal() {
        let (manager, _clock) = manager_at(0);
        manager.set_credentials("a", AuthCredentials::new(CredentialType::ApiKey));

        let err = manager.get_token("a").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingField { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_hmac_requires_hmac_credentials() {
        let (manager, _clock) = manager_at(0);
        manager.set_credentials("a", AuthCredentials::api_key("k1"));

        let err = manager.generate_hmac_signature("a", "x=1").unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_sign_request_requires_rsa_credentials() {
        let (manager, _clock) = manager_at(0);
        manager.set_credentials("vivo", AuthCredentials::hmac("secret"));

        let err = manager
            .sign_request("vivo", "POST", "/dev/push", [("a", "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnsupportedOperation { .. }));
    }

    #[tokio::test]
    async fn test_configured_backends_sorted() {
        let manager = AuthManager::new();
        manager.set_credentials("vivo", AuthCredentials::hmac("s"));
        manager.set_credentials("apple", AuthCredentials::new(CredentialType::Jwt));

        assert_eq!(
            manager.configured_backends(),
            vec!["apple".to_string(), "vivo".to_string()]
        );
        assert_eq!(manager.credential_type("vivo"), Some(CredentialType::Hmac));
        assert_eq!(manager.credential_type("missing"), None);
    }
}
