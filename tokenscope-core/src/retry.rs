//! Rate-limit-aware retry with exponential backoff.
//!
//! Only rate-limit-class failures are retried; everything else propagates on
//! the first attempt. The delay before retry `n` (0-based) is
//! `base_delay * 2^n`.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that can report whether they were caused by rate limiting.
pub trait RateLimitSignal {
    fn is_rate_limited(&self) -> bool;
}

/// Whether a free-form error message describes a rate-limit condition.
pub fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("ratelimit")
        || lower.contains("too many requests")
}

/// Attempt budget and base delay for a retried call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
        }
    }

    /// Same base delay, different attempt budget.
    pub fn with_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    /// Delay before retrying after the given 0-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Outcome of a retried operation that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation failed with an error that is not retried.
    #[error("{0}")]
    Operation(E),

    /// Every allowed attempt was rate limited.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// Collapse into the wrapped error type, mapping the terminal case.
    pub fn into_inner_with(self, exhausted: impl FnOnce(u32, E) -> E) -> E {
        match self {
            RetryError::Operation(e) => e,
            RetryError::Exhausted { attempts, last } => exhausted(attempts, last),
        }
    }
}

/// Run `operation` under `policy`, backing off on rate-limit errors.
pub async fn with_backoff<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RateLimitSignal + std::fmt::Display,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_rate_limited() => return Err(RetryError::Operation(e)),
            Err(e) => {
                if attempt + 1 >= attempts {
                    return Err(RetryError::Exhausted { attempts, last: e });
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        rate_limited: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (rate_limited={})", self.rate_limited)
        }
    }

    impl RateLimitSignal for TestError {
        fn is_rate_limited(&self) -> bool {
            self.rate_limited
        }
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(5, 1000);
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8000));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = RetryPolicy::new(5, 1000);
        assert_eq!(policy.delay_for(80), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_mentions_rate_limit() {
        assert!(mentions_rate_limit("HTTP 429 Too Many Requests"));
        assert!(mentions_rate_limit("error code: rate_limit_exceeded"));
        assert!(!mentions_rate_limit("invalid api key"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_rate_limit_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&RetryPolicy::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { rate_limited: false }) }
        })
        .await;
        assert!(matches!(result, Err(RetryError::Operation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_rate_limits() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&RetryPolicy::new(4, 1000), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError { rate_limited: true })
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_distinguishable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&RetryPolicy::new(3, 10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError { rate_limited: true }) }
        })
        .await;
        match result {
            Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_exponentially() {
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);
        let _ = with_backoff(&RetryPolicy::new(3, 100), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TestError { rate_limited: true }) }
        })
        .await;
        // 100ms + 200ms of virtual time
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }
}
