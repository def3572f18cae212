//! Retry with exponential backoff
//!
//! Every backend call goes through [`with_retry`]. Attempts are strictly
//! sequential: one attempt, one sleep, the next attempt.

use crate::error::{NormalizedError, OperationResult, StoreError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry configuration shared by all adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each later one
    #[serde(with = "duration_ms", rename = "base_delay_ms")]
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy with the given retry count and base delay
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay slept after the failed attempt with index `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }

    /// Total attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Run `operation` under `policy`
///
/// Classified errors with `retryable == false` are returned at once and
/// unmodified. Anything else is retried until the policy is exhausted, after
/// which the last error is wrapped into a non-retryable [`NormalizedError`]
/// tagged with the backend id and `label`.
pub async fn with_retry<T, F, Fut>(
    backend_id: &str,
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> OperationResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(backend = backend_id, label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(StoreError::Normalized(err)) if !err.retryable => return Err(err),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(NormalizedError::exhausted(
                        backend_id,
                        label,
                        attempt + 1,
                        err,
                    ));
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    backend = backend_id,
                    label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// [`with_retry`] that gives up as soon as `cancel` fires
///
/// Cancellation interrupts both an in-flight attempt and a backoff sleep.
pub async fn with_retry_cancellable<T, F, Fut>(
    backend_id: &str,
    policy: &RetryPolicy,
    label: &str,
    cancel: &CancellationToken,
    operation: F,
) -> OperationResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(backend = backend_id, label, "Cancelled");
            Err(NormalizedError::cancelled(backend_id, label))
        }
        result = with_retry(backend_id, policy, label, operation) => result,
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
