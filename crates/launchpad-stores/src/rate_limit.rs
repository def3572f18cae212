//! Token-bucket rate limiting per backend

use crate::error::NormalizedError;
use crate::types::StoreKind;
use launchpad_auth::{Clock, SystemClock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bucket size and refill speed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum tokens held
    pub capacity: f64,
    /// Tokens added per second
    pub refill_rate: f64,
}

impl RateLimitConfig {
    pub const fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
        }
    }

    /// Whether the bucket holds at least one token and refills at a usable rate
    pub fn is_valid(&self) -> bool {
        self.capacity.is_finite()
            && self.capacity >= 1.0
            && self.refill_rate.is_finite()
            && self.refill_rate >= MIN_REFILL_RATE
    }

    /// Clamp the refill rate to [`MIN_REFILL_RATE`]; non-finite or empty
    /// buckets fall back to [`FALLBACK_RATE_LIMIT`]
    pub fn normalized(self) -> Self {
        if !self.capacity.is_finite() || self.capacity < 1.0 || self.refill_rate.is_nan() {
            return FALLBACK_RATE_LIMIT;
        }
        Self {
            capacity: self.capacity,
            refill_rate: self.refill_rate.clamp(MIN_REFILL_RATE, f64::MAX),
        }
    }
}

/// Limit used for backends without a listed default
pub const FALLBACK_RATE_LIMIT: RateLimitConfig = RateLimitConfig::new(10.0, 1.0);

/// Slowest accepted refill: one token every 1000 seconds
pub const MIN_REFILL_RATE: f64 = 0.001;

/// Longest single wait in [`RateLimiter::consume`]
pub const MAX_WAIT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: i64,
}

/// Token bucket guarding one backend
///
/// The bucket starts full. The state lock is never held across an await.
pub struct RateLimiter {
    backend_id: String,
    config: RateLimitConfig,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a full bucket on the system clock
    pub fn new(backend_id: impl Into<String>, config: RateLimitConfig) -> Self {
        Self::with_clock(backend_id, config, Arc::new(SystemClock))
    }

    /// Create a full bucket on the given clock
    pub fn with_clock(
        backend_id: impl Into<String>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let backend_id = backend_id.into();
        let config = if config.is_valid() {
            config
        } else {
            let normalized = config.normalized();
            warn!(
                backend = %backend_id,
                capacity = config.capacity,
                refill_rate = config.refill_rate,
                effective_capacity = normalized.capacity,
                effective_refill_rate = normalized.refill_rate,
                "Unusable rate limit, normalizing"
            );
            normalized
        };

        let now = clock.now_ms();
        Self {
            backend_id,
            config,
            state: Mutex::new(BucketState {
                tokens: config.capacity,
                last_refill: now,
            }),
            clock,
        }
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Add the tokens accrued since the last refill
    pub fn refill(&self) {
        let mut state = self.state.lock();
        self.refill_locked(&mut state);
    }

    /// Tokens currently available
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill_locked(&mut state);
        state.tokens
    }

    /// Take `n` tokens if they are available, without waiting
    pub fn try_consume(&self, n: u32) -> bool {
        let mut state = self.state.lock();
        self.refill_locked(&mut state);

        let n = f64::from(n);
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Take `n` tokens, sleeping until the bucket has refilled enough
    ///
    /// A single wait never exceeds [`MAX_WAIT`].
    pub async fn consume(&self, n: u32) {
        if let Some(wait) = self.reserve_or_wait(n) {
            debug!(
                backend = %self.backend_id,
                wait_ms = wait.as_millis() as u64,
                "Rate limited, waiting"
            );
            tokio::time::sleep(wait).await;
            self.settle_after_wait(n);
        }
    }

    /// [`consume`](Self::consume) that can be abandoned through `cancel`
    ///
    /// Tokens are only taken when the wait completes.
    pub async fn consume_cancellable(
        &self,
        n: u32,
        cancel: &CancellationToken,
    ) -> Result<(), NormalizedError> {
        if let Some(wait) = self.reserve_or_wait(n) {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(NormalizedError::cancelled(&self.backend_id, "rate limiter wait"));
                }
                _ = tokio::time::sleep(wait) => {}
            }
            self.settle_after_wait(n);
        }
        Ok(())
    }

    /// Consume immediately, or report how long to wait for the deficit
    fn reserve_or_wait(&self, n: u32) -> Option<Duration> {
        let mut state = self.state.lock();
        self.refill_locked(&mut state);

        let n = f64::from(n);
        if state.tokens >= n {
            state.tokens -= n;
            return None;
        }

        Some(wait_for(n - state.tokens, self.config.refill_rate))
    }

    fn settle_after_wait(&self, n: u32) {
        let mut state = self.state.lock();
        state.tokens = 0.0;
        self.refill_locked(&mut state);
        state.tokens = (state.tokens - f64::from(n)).max(0.0);
    }

    fn refill_locked(&self, state: &mut BucketState) {
        let now = self.clock.now_ms();
        let elapsed_secs = (now - state.last_refill).max(0) as f64 / 1000.0;
        state.tokens = (state.tokens + elapsed_secs * self.config.refill_rate)
            .min(self.config.capacity);
        state.last_refill = now;
    }
}

/// Time to accrue `deficit` tokens, capped at [`MAX_WAIT`]
fn wait_for(deficit: f64, refill_rate: f64) -> Duration {
    Duration::try_from_secs_f64(deficit / refill_rate)
        .map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT))
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("backend_id", &self.backend_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds and caches one [`RateLimiter`] per backend id
pub struct RateLimiterFactory {
    overrides: HashMap<String, RateLimitConfig>,
    fallback: RateLimitConfig,
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiterFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            overrides: HashMap::new(),
            fallback: FALLBACK_RATE_LIMIT,
            limiters: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Replace the limit of one backend
    pub fn with_override(mut self, backend_id: impl Into<String>, config: RateLimitConfig) -> Self {
        self.overrides.insert(backend_id.into(), config);
        self
    }

    /// Replace the limit used for unlisted backends
    pub fn with_fallback(mut self, config: RateLimitConfig) -> Self {
        self.fallback = config;
        self
    }

    /// Effective configuration for a backend
    pub fn config_for(&self, backend_id: &str) -> RateLimitConfig {
        self.overrides
            .get(backend_id)
            .copied()
            .or_else(|| StoreKind::from_id(backend_id).map(|k| k.default_rate_limit()))
            .unwrap_or(self.fallback)
    }

    /// The limiter for a backend, created on first use
    pub fn limiter(&self, backend_id: &str) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock();
        limiters
            .entry(backend_id.to_string())
            .or_insert_with(|| {
                let config = self.config_for(backend_id);
                debug!(
                    backend = backend_id,
                    capacity = config.capacity,
                    refill_rate = config.refill_rate,
                    "Creating rate limiter"
                );
                Arc::new(RateLimiter::with_clock(
                    backend_id,
                    config,
                    Arc::clone(&self.clock),
                ))
            })
            .clone()
    }
}

impl Default for RateLimiterFactory {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}
