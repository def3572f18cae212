//! Error types for authentication

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Authentication-related errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credentials registered for the backend
    #[error("No credentials configured for '{0}'")]
    NoCredentials(String),

    /// A required credential field is missing
    #[error("Credentials for '{backend}' are missing required field '{field}'")]
    MissingField { backend: String, field: String },

    /// Key or credential file could not be read
    #[error("Failed to read key file {path}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key material could not be parsed
    #[error("Invalid key material for '{backend}': {reason}")]
    InvalidKey { backend: String, reason: String },

    /// Credential descriptor could not be parsed
    #[error("Invalid credential descriptor {path}: {reason}")]
    InvalidDescriptor { path: PathBuf, reason: String },

    /// Credential type has no signing key of the requested kind
    #[error("Credentials for '{backend}' do not support {operation}")]
    UnsupportedOperation { backend: String, operation: String },

    /// Token endpoint rejected the request
    #[error("Token endpoint rejected credentials for '{backend}' ({status}): {body}")]
    TokenRejected {
        backend: String,
        status: u16,
        body: String,
    },

    /// Token endpoint failed server-side
    #[error("Token endpoint unavailable for '{backend}' ({status}): {body}")]
    TokenEndpointUnavailable {
        backend: String,
        status: u16,
        body: String,
    },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JWT error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Whether this error stems from configuration rather than a transient failure.
    ///
    /// Fatal errors are never retried by the dispatch layer.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AuthError::TokenEndpointUnavailable { .. } | AuthError::Http(_)
        )
    }

    /// Backend the error was raised for, when known
    pub fn backend_id(&self) -> Option<&str> {
        match self {
            AuthError::NoCredentials(backend)
            | AuthError::MissingField { backend, .. }
            | AuthError::InvalidKey { backend, .. }
            | AuthError::UnsupportedOperation { backend, .. }
            | AuthError::TokenRejected { backend, .. }
            | AuthError::TokenEndpointUnavailable { backend, .. } => Some(backend),
            _ => None,
        }
    }

    /// HTTP status reported by the token endpoint, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AuthError::TokenRejected { status, .. }
            | AuthError::TokenEndpointUnavailable { status, .. } => Some(*status),
            AuthError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
