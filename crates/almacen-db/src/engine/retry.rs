//! Conflict retry for engine operations.
//!
//! An attempt that loses a version check (or finds SQLite busy) has
//! already rolled back its transaction by dropping it. The whole attempt,
//! reads included, runs again after an exponential backoff.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::warn;

use crate::error::{LedgerError, LedgerResult};

/// How often and how patiently a conflicting operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles (with jitter) after that.
    pub initial_backoff: Duration,
    /// Ceiling for a single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Creates the exponential backoff schedule for one operation.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            // Attempts are bounded by max_retries instead.
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// Runs `attempt` until it succeeds, fails with a non-conflict error, or
/// runs out of retries.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> LedgerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LedgerResult<T>>,
{
    let mut backoff = policy.create_backoff();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;

        match attempt().await {
            Err(err) if err.is_conflict() => {
                let delay = match backoff.next_backoff() {
                    Some(delay) if attempts <= policy.max_retries => delay,
                    _ => {
                        warn!(operation, attempts, error = %err, "Giving up after repeated conflicts");
                        return Err(LedgerError::RetriesExhausted {
                            operation,
                            attempts,
                        });
                    }
                };

                warn!(
                    operation,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Write conflict, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            outcome => return outcome,
        }
    }
}
