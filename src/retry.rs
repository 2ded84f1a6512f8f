//! Retry policy for remote lookups.
//!
//! A [`RetryPolicy`] bounds each attempt with a timeout, caps the number of
//! attempts and sleeps an exponentially growing, jittered delay between them.
//! Errors decide for themselves whether another attempt can help through
//! [`Retryable`].

use std::{fmt::Display, future::Future, time::Duration};

use rand::Rng;

/// Classification hook for errors produced by a retried operation.
pub trait Retryable: Sized {
    /// Whether a later attempt could succeed.
    fn is_retryable(&self) -> bool;

    /// Error value for an attempt that exceeded the per-attempt timeout.
    fn timed_out(after: Duration) -> Self;
}

/// Attempt budget and backoff schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for every later attempt.
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the random jitter added to each delay.
    pub max_jitter: Duration,
    /// Budget for a single attempt. The attempt future is dropped when it runs out.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::stock_lookup()
    }
}

impl RetryPolicy {
    /// Schedule used for bulk stock lookups: 3 attempts, 500ms doubling
    /// backoff with up to 200ms jitter, 8s per attempt.
    pub const fn stock_lookup() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(200),
            attempt_timeout: Duration::from_secs(8),
        }
    }

    /// Deterministic part of the delay before `attempt` (1-indexed).
    ///
    /// The first attempt runs immediately; attempt `n >= 2` waits
    /// `base_delay * 2^(n-2)`.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor)
    }

    /// Full delay before `attempt`, jitter included.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_backoff(attempt);
        if base.is_zero() {
            return base;
        }
        base + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }

    /// Whether `err`, produced by `attempt`, should be followed by another attempt.
    pub fn should_retry<E: Retryable>(&self, err: &E, attempt: u32) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }

    /// Runs `op` under this policy.
    ///
    /// `op` receives the 1-indexed attempt number. Returns the first success,
    /// or the error of the last attempt once the budget is spent or the error
    /// is not retryable.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.attempt_timeout, op(attempt)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(E::timed_out(self.attempt_timeout)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, attempt) => {
                    let delay = self.backoff_delay(attempt + 1);
                    tracing::debug!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "Giving up after failed attempt");
                    return Err(err);
                }
            }
        }
    }
}
