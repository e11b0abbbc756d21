// src/api/retry.rs
//! Bounded exponential-backoff retry for fallible async calls.

use crate::error::{ClientError, Result};
use log::{debug, error, info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy with exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Stop at the first error that `ClientError::is_retryable` rejects.
    /// Off by default: every failure is retried until the budget runs out.
    pub stop_on_terminal: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            stop_on_terminal: false,
        }
    }

    /// Read-only network and chain queries
    pub fn read() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(5))
    }

    /// Signed transactions: a single attempt, never resubmitted
    pub fn transaction() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_stop_on_terminal(mut self, stop: bool) -> Self {
        self.stop_on_terminal = stop;
        self
    }

    /// Delay slept after failed attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u128.saturating_pow(attempt - 1);
        let delay_ms = self
            .base_delay
            .as_millis()
            .saturating_mul(factor)
            .min(self.max_delay.as_millis());
        Duration::from_millis(delay_ms as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::read()
    }
}

/// Run `operation` until it succeeds or the attempt budget is spent.
///
/// Sleeps only between attempts, so `n` attempts sleep at most `n - 1` times. On
/// exhaustion the last error is returned wrapped in `ClientError::RetriesExhausted`
/// with `label` and the number of attempts made.
pub async fn with_retry<F, Fut, T>(mut operation: F, policy: &RetryPolicy, label: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded after {} attempts", label, attempt);
                }
                return Ok(value);
            }
            Err(e) => {
                let terminal = policy.stop_on_terminal && !e.is_retryable();
                if attempt >= max_attempts || terminal {
                    if terminal {
                        warn!("{} hit non-retryable error on attempt {}: {}", label, attempt, e);
                    } else {
                        error!("{}: all {} attempts failed, last error: {}", label, attempt, e);
                    }
                    return Err(ClientError::RetriesExhausted {
                        label: label.to_string(),
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }

                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "{} attempt {}/{} failed: {} (retrying in {:?})",
                    label, attempt, max_attempts, e, delay
                );
                sleep(delay).await;
                debug!("{} retrying, attempt {}", label, attempt + 1);
            }
        }
    }
}
