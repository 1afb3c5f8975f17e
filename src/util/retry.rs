//! Bounded retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use uuid::Uuid;

use crate::error::SessionError;

/// Retry policy for refresh calls.
///
/// The default performs a single attempt: a failed refresh logs the session out
/// immediately. Raise `max_attempts` to retry transient failures first.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first); zero acts as one.
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    /// Retry transient failures up to `max_attempts` total attempts.
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::no_retry()
        }
    }

    /// Run `operation`, retrying errors that report `is_retryable` until
    /// `max_attempts` is spent. The last error is returned.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, SessionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let mut attempt = 1;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if attempt >= self.max_attempts || !err.is_retryable() {
                return Err(err);
            }
            let delay = self.delay_before(attempt);
            tracing::warn!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "refresh attempt failed; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Backoff after `attempt` failures, capped and jittered to 75-125%.
    fn delay_before(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let base = (self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent))
            .min(self.max_backoff.as_secs_f64())
            .max(0.0);
        Duration::from_secs_f64(base * (0.75 + 0.5 * jitter()))
    }
}

/// Uniform value in [0, 1) from the low 53 bits of a v4 UUID, which carry no
/// version or variant bits.
fn jitter() -> f64 {
    const MASK: u128 = (1 << 53) - 1;
    (Uuid::new_v4().as_u128() & MASK) as f64 / (1u64 << 53) as f64
}
