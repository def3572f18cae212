//! Store adapters and resilient dispatch for Launchpad
//!
//! This crate puts every supported distribution backend behind one
//! [`StoreAdapter`] contract and wraps each backend call in the same dispatch
//! policy:
//!
//! - **Authorization** through a shared [`launchpad_auth::AuthManager`]
//! - **Rate limiting** with one token bucket per backend ([`rate_limit`])
//! - **Retries** with exponential backoff for transient failures ([`retry`])
//! - **Error normalization** into a single [`NormalizedError`] shape ([`error`])
//!
//! ## Supported Stores
//!
//! - **apple**: App Store Connect (ES256 JWT)
//! - **google-play**: Google Play Developer API (service account)
//! - **microsoft**: Microsoft Store submission API (client credentials)
//! - **huawei**: AppGallery Connect (client credentials, ICP filing)
//! - **xiaomi**: Xiaomi GetApps (RSA signed requests, ICP filing)
//! - **vivo**: vivo App Store (HMAC signed requests, ICP filing)
//! - **firebase**: Firebase App Distribution (API key)
//!
//! ## Usage
//!
//! ```ignore
//! use launchpad_auth::{AuthCredentials, AuthManager};
//! use launchpad_stores::{AdapterRegistry, ReleaseRef};
//! use std::sync::Arc;
//!
//! let auth = Arc::new(AuthManager::new());
//! auth.set_credentials("firebase", AuthCredentials::api_key(key));
//!
//! let registry = AdapterRegistry::create_default(auth);
//! let firebase = registry.get_adapter("firebase").unwrap();
//! let status = firebase.get_status(&ReleaseRef::new(app_id)).await?;
//! ```

pub mod client;
pub mod error;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod stores;
pub mod traits;
pub mod types;

pub use client::StoreBase;
pub use error::{ErrorCode, NormalizedError, OperationResult, Severity, StoreError};
pub use rate_limit::{RateLimitConfig, RateLimiter, RateLimiterFactory};
pub use registry::{AdapterRegistry, DispatchSettings};
pub use retry::{with_retry, with_retry_cancellable, RetryPolicy};
pub use traits::StoreAdapter;
pub use types::*;
