//! Shared plumbing composed by every store adapter
//!
//! [`StoreBase`] owns what adapters have in common: request authorization for
//! each credential family, rate limiting, HTTP status classification, artifact
//! validation and the retry policy.

use crate::error::{ErrorCode, NormalizedError, OperationResult, Result, StoreError};
use crate::rate_limit::RateLimiter;
use crate::retry::{self, RetryPolicy};
use crate::types::{Operation, StoreCapabilities, StoreKind, Support, UnsupportedOperation};
use launchpad_auth::{canonicalize_params, AuthError, AuthManager, CredentialType};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Signature method reported alongside HMAC-signed parameters
pub const HMAC_SIGN_METHOD: &str = "hmac";

/// Composition object shared by all adapters
pub struct StoreBase {
    kind: StoreKind,
    capabilities: StoreCapabilities,
    auth: Arc<AuthManager>,
    http: Client,
    base_url: String,
    retry: RetryPolicy,
    limiter: Arc<RateLimiter>,
}

impl StoreBase {
    /// Create a base for `kind` using its production URL and the default retry policy
    pub fn new(kind: StoreKind, auth: Arc<AuthManager>, limiter: Arc<RateLimiter>) -> Self {
        let mut capabilities = kind.capabilities();
        capabilities.rate_limit = limiter.config();

        Self {
            kind,
            capabilities,
            auth,
            http: Client::new(),
            base_url: kind.default_base_url().to_string(),
            retry: RetryPolicy::default(),
            limiter,
        }
    }

    /// Point the adapter at another API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn id(&self) -> &'static str {
        self.kind.id()
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn capabilities(&self) -> &StoreCapabilities {
        &self.capabilities
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Structured result for an operation this backend does not offer
    pub fn unsupported<T>(&self, operation: Operation) -> OperationResult<Support<T>> {
        debug!(backend = self.id(), %operation, "Operation not supported");
        Ok(Support::Unsupported(UnsupportedOperation::new(
            self.id(),
            operation,
        )))
    }

    /// Run one attempt function under the retry policy
    pub async fn with_retry<T, F, Fut>(&self, label: &str, operation: F) -> OperationResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry::with_retry(self.id(), &self.retry, label, operation).await
    }

    /// Verify that the registered credentials can authorize a request
    ///
    /// Token families acquire a token; signature families produce a
    /// throwaway signature to prove the key material is usable.
    #[instrument(skip(self), fields(backend = self.id()))]
    pub async fn authenticate(&self) -> OperationResult<()> {
        self.with_retry("authenticate", || async {
            match self.credential_type()? {
                CredentialType::Rsa => {
                    self.auth
                        .sign_request(self.id(), "GET", "/", [("probe", "1")])
                        .await?;
                }
                CredentialType::Hmac => {
                    self.auth.generate_hmac_signature(self.id(), "probe=1")?;
                }
                _ => {
                    self.auth.get_token(self.id()).await?;
                }
            }
            Ok(())
        })
        .await
    }

    /// Fail unless the artifact exists, has an accepted extension and fits the size limit
    ///
    /// Returns the artifact size in bytes.
    pub async fn validate_artifact(&self, path: &Path) -> Result<u64> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        if !self.capabilities.accepts_extension(&extension) {
            return Err(self.invalid(format!(
                "{} does not accept .{} artifacts (expected one of: {})",
                self.capabilities.display_name,
                extension,
                self.capabilities.file_types.join(", ")
            )));
        }

        let size = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Err(self.invalid(format!("{} is not a file", path.display()))),
            Err(e) => {
                return Err(self.invalid(format!(
                    "Cannot read artifact {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        if size > self.capabilities.max_upload_bytes {
            return Err(self.invalid(format!(
                "Artifact is {} bytes; {} accepts at most {} bytes",
                size, self.capabilities.display_name, self.capabilities.max_upload_bytes
            )));
        }

        debug!(backend = self.id(), path = %path.display(), size, "Artifact validated");
        Ok(size)
    }

    /// Non-retryable validation error for this backend
    pub fn invalid(&self, message: impl Into<String>) -> StoreError {
        NormalizedError::new(ErrorCode::ValidationFailed, message)
            .with_backend(self.id())
            .into()
    }

    /// Wait for a rate limiter token
    pub async fn throttle(&self) {
        self.limiter.consume(1).await;
    }

    /// Current token for bearer and API-key families, after throttling
    pub async fn token(&self) -> Result<String> {
        self.throttle().await;
        Ok(self.auth.get_token(self.id()).await?)
    }

    /// Request carrying `Authorization: Bearer <token>`
    pub async fn bearer(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let token = self.token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    /// Unauthenticated request, after throttling
    ///
    /// Used by the signature families, which authorize through the parameters.
    pub async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        self.throttle().await;
        Ok(self.http.request(method, url))
    }

    /// Add timestamp and signature parameters for RSA or HMAC backends
    pub async fn sign_params(
        &self,
        uri: &str,
        mut params: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let timestamp = self.auth.clock().now_ms().to_string();

        match self.credential_type()? {
            CredentialType::Rsa => {
                params.insert("timestamp".to_string(), timestamp);
                let signature = self
                    .auth
                    .sign_request(self.id(), "POST", uri, &params)
                    .await?;
                params.insert("sign".to_string(), signature);
            }
            CredentialType::Hmac => {
                let credentials = self
                    .auth
                    .credentials(self.id())
                    .ok_or_else(|| AuthError::NoCredentials(self.id().to_string()))?;
                let access_key = credentials.require(self.id(), "access_key")?;

                params.insert("access_key".to_string(), access_key.to_string());
                params.insert("timestamp".to_string(), timestamp);
                params.insert("sign_method".to_string(), HMAC_SIGN_METHOD.to_string());

                let canonical = canonicalize_params(&params);
                let signature = self.auth.generate_hmac_signature(self.id(), &canonical)?;
                params.insert("sign".to_string(), signature);
            }
            other => {
                return Err(AuthError::UnsupportedOperation {
                    backend: self.id().to_string(),
                    operation: format!("parameter signing with {} credentials", other),
                }
                .into())
            }
        }

        Ok(params)
    }

    /// Send a request and decode the JSON body
    ///
    /// Non-success statuses become classified [`NormalizedError`]s; an auth
    /// failure also drops the cached token so the next attempt re-authenticates.
    pub async fn send_json(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                self.auth.invalidate(self.id());
            }
            debug!(backend = self.id(), status = status.as_u16(), "Request failed");
            return Err(NormalizedError::from_status(self.id(), status.as_u16(), &body).into());
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn credential_type(&self) -> Result<CredentialType> {
        let expected = self.capabilities.auth_method;
        let actual = self
            .auth
            .credential_type(self.id())
            .ok_or_else(|| AuthError::NoCredentials(self.id().to_string()))?;

        if expected.credential_type() != actual {
            return Err(NormalizedError::new(
                ErrorCode::InvalidCredentials,
                format!(
                    "{} expects {} credentials but {} credentials are configured",
                    self.id(),
                    expected.credential_type(),
                    actual
                ),
            )
            .with_backend(self.id())
            .retryable(false)
            .into());
        }
        Ok(actual)
    }
}

impl std::fmt::Debug for StoreBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBase")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// String at a JSON pointer
pub(crate) fn json_str(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// String at a JSON pointer, or an unexpected-response error naming the pointer
pub(crate) fn require_str(value: &Value, pointer: &str) -> Result<String> {
    json_str(value, pointer)
        .ok_or_else(|| StoreError::UnexpectedResponse(format!("missing {}", pointer)))
}
