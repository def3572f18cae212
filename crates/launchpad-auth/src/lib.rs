//! Launchpad Auth - credential management and request authorization
//!
//! This crate owns everything a store adapter needs to authorize a request:
//! - **Credentials**: per-backend credential descriptors
//! - **Signing**: JWT issuance, OAuth2 token exchange, RSA and HMAC request signatures
//! - **AuthManager**: token cache and refresh orchestration keyed by backend id
//!
//! ## Usage
//!
//! ```ignore
//! use launchpad_auth::{AuthCredentials, AuthManager, CredentialType};
//!
//! let auth = AuthManager::new();
//! auth.set_credentials("firebase", AuthCredentials::api_key("secret"));
//! let token = auth.get_token("firebase").await?;
//! ```

pub mod clock;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod signing;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{AuthCredentials, CredentialStore, CredentialType};
pub use error::{AuthError, Result};
pub use manager::AuthManager;
pub use signing::canonicalize_params;
pub use token::CachedToken;
