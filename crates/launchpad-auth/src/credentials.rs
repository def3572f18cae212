//! Credential descriptors and the in-memory credential store

use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Authorization protocol family of a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    /// OAuth2 service account or client credentials
    OAuth2,
    /// Locally signed ES256 JWT
    Jwt,
    /// Per-request RSA-SHA256 signature
    Rsa,
    /// Per-request HMAC-SHA256 signature
    Hmac,
    /// Static API key
    ApiKey,
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialType::OAuth2 => write!(f, "oauth2"),
            CredentialType::Jwt => write!(f, "jwt"),
            CredentialType::Rsa => write!(f, "rsa"),
            CredentialType::Hmac => write!(f, "hmac"),
            CredentialType::ApiKey => write!(f, "apikey"),
        }
    }
}

/// Raw credential descriptor for one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthCredentials {
    /// Protocol family
    #[serde(rename = "type")]
    pub credential_type: CredentialType,

    /// Path to a key or service-account file
    #[serde(default, alias = "filePath", skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Family-specific settings
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl AuthCredentials {
    /// Create an empty descriptor of the given type
    pub fn new(credential_type: CredentialType) -> Self {
        Self {
            credential_type,
            file_path: None,
            config: HashMap::new(),
        }
    }

    /// Static API key credentials
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::new(CredentialType::ApiKey).with("api_key", key)
    }

    /// HMAC shared-secret credentials
    pub fn hmac(secret: impl Into<String>) -> Self {
        Self::new(CredentialType::Hmac).with("secret", secret)
    }

    /// RSA private key credentials from PEM contents
    pub fn rsa(private_key_pem: impl Into<String>) -> Self {
        Self::new(CredentialType::Rsa).with("private_key", private_key_pem)
    }

    /// OAuth2 client-credentials grant
    pub fn client_credentials(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::new(CredentialType::OAuth2)
            .with("token_url", token_url)
            .with("client_id", client_id)
            .with("client_secret", client_secret)
    }

    /// Add a config entry
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    /// Set the key file path
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Look up an optional config value, treating empty strings as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Look up a required config value
    pub fn require(&self, backend: &str, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| AuthError::MissingField {
            backend: backend.to_string(),
            field: key.to_string(),
        })
    }

    /// Whether an OAuth2 credential uses the client-credentials grant
    pub fn is_client_credentials(&self) -> bool {
        self.credential_type == CredentialType::OAuth2 && self.get("client_id").is_some()
    }

    /// Resolve private key PEM from `private_key` or the key file
    pub async fn private_key_pem(&self, backend: &str) -> Result<String> {
        if let Some(pem) = self.get("private_key") {
            return Ok(pem.replace("\\n", "\n"));
        }

        match &self.file_path {
            Some(path) => read_key_file(path).await,
            None => Err(AuthError::MissingField {
                backend: backend.to_string(),
                field: "private_key".to_string(),
            }),
        }
    }

    /// Read a credential descriptor from a JSON or TOML file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = read_key_file(path).await?;
        let is_toml = path.extension().is_some_and(|e| e == "toml");

        let parsed = if is_toml {
            toml::from_str::<Self>(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<Self>(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|reason| AuthError::InvalidDescriptor {
            path: path.to_path_buf(),
            reason,
        })
    }
}

pub(crate) async fn read_key_file(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| AuthError::KeyFile {
            path: path.to_path_buf(),
            source,
        })
}

/// In-memory map of backend id to credential descriptor
#[derive(Debug, Default)]
pub struct CredentialStore {
    entries: BTreeMap<String, AuthCredentials>,
}

impl CredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register credentials, replacing any previous entry
    pub fn insert(&mut self, backend_id: &str, credentials: AuthCredentials) {
        debug!(
            backend = backend_id,
            credential_type = %credentials.credential_type,
            "Registering credentials"
        );
        self.entries.insert(backend_id.to_string(), credentials);
    }

    /// Look up credentials
    pub fn get(&self, backend_id: &str) -> Option<&AuthCredentials> {
        self.entries.get(backend_id)
    }

    /// Remove credentials
    pub fn remove(&mut self, backend_id: &str) -> Option<AuthCredentials> {
        self.entries.remove(backend_id)
    }

    /// Ids with registered credentials, sorted
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of registered backends
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no backend is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
