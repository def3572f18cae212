//! Cached bearer tokens

/// Safety margin subtracted from a token's lifetime before it is considered stale
pub const EXPIRY_BUFFER_MS: i64 = 60_000;

/// A token together with its absolute expiry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    /// Token value handed to adapters
    pub token: String,

    /// Expiry in epoch milliseconds
    pub expires_at: i64,
}

impl CachedToken {
    /// Create a token expiring `ttl_ms` after `now_ms`
    pub fn new(token: impl Into<String>, now_ms: i64, ttl_ms: i64) -> Self {
        Self {
            token: token.into(),
            expires_at: now_ms.saturating_add(ttl_ms),
        }
    }

    /// Whether the token is still usable at `now_ms`, honouring the expiry buffer
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms.saturating_add(EXPIRY_BUFFER_MS)
    }
}
