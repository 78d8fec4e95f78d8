//! Bounded retry for the network-bound stage boundaries

use crate::error::EtlError;
use std::future::Future;
use std::time::Duration;

/// Attempt count and base backoff for a retried operation
///
/// The backoff doubles after each failed attempt. Only errors that report
/// themselves as transient are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::single_attempt()
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// No retries at all
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    fn delay(&self, attempt: usize) -> Duration {
        self.backoff * (1u32 << attempt.min(10))
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of attempts
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T, EtlError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EtlError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if !e.is_transient() || attempt >= self.max_attempts {
                        return Err(e);
                    }

                    let delay = self.delay(attempt - 1);
                    log::warn!(
                        "Retryable error in {} (attempt {}/{}), retrying in {:?}: {}",
                        operation_name,
                        attempt,
                        self.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
