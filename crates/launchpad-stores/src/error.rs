//! Store error types
//!
//! Two tiers:
//! - [`StoreError`] is what a single attempt of a backend call fails with.
//! - [`NormalizedError`] is the structured error every operation resolves to
//!   once the dispatch layer is done with it.

use launchpad_auth::AuthError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for a single store call attempt
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result type for adapter operations
pub type OperationResult<T> = std::result::Result<T, NormalizedError>;

/// Classification code of a normalized error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Backend rejected the credentials
    AuthenticationFailed,
    /// Credentials are missing or malformed
    InvalidCredentials,
    /// Backend has no adapter or no configuration
    NotConfigured,
    /// Request or artifact was rejected as invalid
    ValidationFailed,
    /// Requested resource does not exist
    NotFound,
    /// Request conflicts with the backend's current state
    Conflict,
    /// Backend throttled the request
    RateLimited,
    /// Backend returned a server error
    BackendUnavailable,
    /// Connection-level failure
    Network,
    /// Request timed out
    Timeout,
    /// Operation was cancelled by the caller
    Cancelled,
    /// Operation is not offered by the backend
    Unsupported,
    /// Anything else
    Internal,
}

impl ErrorCode {
    /// Stable string form
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => "authentication_failed",
            ErrorCode::InvalidCredentials => "invalid_credentials",
            ErrorCode::NotConfigured => "not_configured",
            ErrorCode::ValidationFailed => "validation_failed",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::BackendUnavailable => "backend_unavailable",
            ErrorCode::Network => "network",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Unsupported => "unsupported",
            ErrorCode::Internal => "internal",
        }
    }

    /// Whether errors of this class are retried unless an adapter says otherwise
    pub fn default_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimited
                | ErrorCode::BackendUnavailable
                | ErrorCode::Network
                | ErrorCode::Timeout
        )
    }

    /// Actionable hint shown alongside the error
    pub fn default_suggestion(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => {
                "Check that the credentials are valid and have access to this app"
            }
            ErrorCode::InvalidCredentials => {
                "Fix the credential configuration (key files, ids and secrets) for this store"
            }
            ErrorCode::NotConfigured => "Add credentials for this store to the configuration",
            ErrorCode::ValidationFailed => "Review the request parameters and artifact",
            ErrorCode::NotFound => "Verify the app id, build id or track name",
            ErrorCode::Conflict => "Wait for the pending change to finish, then try again",
            ErrorCode::RateLimited => "Slow down requests or try again later",
            ErrorCode::BackendUnavailable => "The store is having problems; try again later",
            ErrorCode::Network => "Check network connectivity to the store API",
            ErrorCode::Timeout => "Try again; large uploads may need a faster connection",
            ErrorCode::Cancelled => "The operation was cancelled before it completed",
            ErrorCode::Unsupported => "Use a store that supports this operation",
            ErrorCode::Internal => "Re-run with RUST_LOG=debug and report the failure",
        }
    }

    /// Default severity of this class
    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorCode::InvalidCredentials | ErrorCode::NotConfigured => Severity::Critical,
            ErrorCode::Unsupported | ErrorCode::Cancelled => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity level of a normalized error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Structured, human-readable error returned by every store operation
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct NormalizedError {
    pub code: ErrorCode,
    pub message: String,
    pub suggestion: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub retryable: bool,
}

impl NormalizedError {
    /// Create an error with the code's default suggestion, severity and retryability
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestion: code.default_suggestion().to_string(),
            severity: code.default_severity(),
            backend_id: None,
            status_code: None,
            retryable: code.default_retryable(),
        }
    }

    /// Tag with the backend id
    pub fn with_backend(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = Some(backend_id.into());
        self
    }

    /// Attach the HTTP status
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Override the suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    /// Override the severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Override retryability
    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Classify a non-success HTTP response
    pub fn from_status(backend_id: &str, status: u16, body: &str) -> Self {
        let code = match status {
            401 | 403 => ErrorCode::AuthenticationFailed,
            404 => ErrorCode::NotFound,
            409 => ErrorCode::Conflict,
            408 => ErrorCode::Timeout,
            429 => ErrorCode::RateLimited,
            400 | 413 | 422 => ErrorCode::ValidationFailed,
            s if s >= 500 => ErrorCode::BackendUnavailable,
            _ => ErrorCode::Internal,
        };

        let detail = body.trim();
        let message = if detail.is_empty() {
            format!("{} returned HTTP {}", backend_id, status)
        } else {
            format!("{} returned HTTP {}: {}", backend_id, status, truncate(detail, 500))
        };

        Self::new(code, message)
            .with_backend(backend_id)
            .with_status(status)
    }

    /// Error for a backend that answered successfully at HTTP level but
    /// reported a failure in its payload
    pub fn backend_rejected(backend_id: &str, code: impl std::fmt::Display, message: &str) -> Self {
        Self::new(
            ErrorCode::ValidationFailed,
            format!("{} rejected the request ({}): {}", backend_id, code, message),
        )
        .with_backend(backend_id)
    }

    /// Error for an operation abandoned through a cancellation token
    pub fn cancelled(backend_id: &str, context: &str) -> Self {
        Self::new(ErrorCode::Cancelled, format!("{} was cancelled", context))
            .with_backend(backend_id)
    }

    /// Wrap the last failure of an exhausted retry loop
    pub fn exhausted(backend_id: &str, context: &str, attempts: u32, err: StoreError) -> Self {
        let inner = err.into_normalized(backend_id);
        Self {
            message: format!(
                "{} failed after {} attempt{}: {}",
                context,
                attempts,
                if attempts == 1 { "" } else { "s" },
                inner.message
            ),
            backend_id: Some(backend_id.to_string()),
            retryable: false,
            ..inner
        }
    }
}

impl From<AuthError> for NormalizedError {
    fn from(err: AuthError) -> Self {
        let code = match &err {
            AuthError::NoCredentials(_) => ErrorCode::NotConfigured,
            AuthError::TokenRejected { .. } => ErrorCode::AuthenticationFailed,
            AuthError::TokenEndpointUnavailable { .. } => ErrorCode::BackendUnavailable,
            AuthError::Http(e) if e.is_timeout() => ErrorCode::Timeout,
            AuthError::Http(_) => ErrorCode::Network,
            _ => ErrorCode::InvalidCredentials,
        };

        let mut normalized = Self::new(code, err.to_string()).retryable(!err.is_fatal());
        normalized.status_code = err.status_code();
        normalized.backend_id = err.backend_id().map(String::from);
        normalized
    }
}

/// Failure of a single store call attempt
#[derive(Debug, Error)]
pub enum StoreError {
    /// Already classified failure
    #[error(transparent)]
    Normalized(#[from] NormalizedError),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Response did not have the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<AuthError> for StoreError {
    fn from(err: AuthError) -> Self {
        StoreError::Normalized(err.into())
    }
}

impl StoreError {
    /// Whether the dispatch layer may retry this failure
    ///
    /// Unclassified failures are retried; classified ones carry their own flag.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Normalized(e) => e.retryable,
            _ => true,
        }
    }

    /// Convert into a normalized error tagged with the backend id
    pub fn into_normalized(self, backend_id: &str) -> NormalizedError {
        let normalized = match self {
            StoreError::Normalized(e) => e,
            StoreError::Http(e) => {
                let code = if e.is_timeout() {
                    ErrorCode::Timeout
                } else if e.is_decode() {
                    ErrorCode::Internal
                } else {
                    ErrorCode::Network
                };
                let status = e.status().map(|s| s.as_u16());
                let mut normalized = NormalizedError::new(code, e.to_string());
                normalized.status_code = status;
                normalized
            }
            StoreError::Json(e) => NormalizedError::new(
                ErrorCode::Internal,
                format!("Could not parse response: {}", e),
            ),
            StoreError::Io(e) => NormalizedError::new(ErrorCode::Internal, e.to_string()),
            StoreError::UnexpectedResponse(msg) => {
                NormalizedError::new(ErrorCode::Internal, format!("Unexpected response: {}", msg))
            }
        };

        if normalized.backend_id.is_some() {
            normalized
        } else {
            normalized.with_backend(backend_id)
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
