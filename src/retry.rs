//! Retry with exponential backoff for classifier calls.
//!
//! Transient failures are retried up to `max_retries` times; each wait is the
//! previous one times `backoff_multiplier`, capped at `max_delay`. With `jitter`
//! on, each wait is stretched by a random factor in [1, 2].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use metrics::counter;
use rand::Rng;

use crate::error::ClassifierError;

/// Errors that know whether another attempt could succeed.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ClassifierError {
    fn is_retryable(&self) -> bool {
        matches!(self, ClassifierError::Transient(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the retry budget is spent.
/// Returns the last error in the latter two cases.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + Display,
{
    let mut attempt = 0u32;
    let mut delay = policy.initial_delay;

    loop {
        match operation().await {
            Ok(v) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "classifier call succeeded after retry");
                }
                return Ok(v);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                counter!("classifier_retries_total").increment(1);
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "classifier call failed, retrying"
                );

                let wait = if policy.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                let next = Duration::from_secs_f64(delay.as_secs_f64() * policy.backoff_multiplier);
                delay = next.min(policy.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(error = %e, attempts = attempt + 1, "retries exhausted");
                } else {
                    tracing::debug!(error = %e, "non-retryable classifier failure");
                }
                return Err(e);
            }
        }
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::rng().random_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
