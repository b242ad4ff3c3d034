//! Exponential backoff for remote calls.

use super::{RemoteError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently a remote call is retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (0 is treated as 1)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts,
            backoff_base,
        }
    }

    /// `backoff_base * 2^attempt`, with `attempt` counted from zero.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }

    /// Run `call` until it succeeds or attempts run out.
    ///
    /// A rate-limit response always waits before the next attempt. Any other error
    /// waits only if another attempt remains. The last error is returned as is.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let err: RemoteError = match call().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            let last = attempt + 1 >= max_attempts;
            let wait = self.delay_for(attempt);

            if err.is_rate_limited() {
                warn!(
                    "{}: rate limited, waiting {:?} before retry",
                    operation, wait
                );
                tokio::time::sleep(wait).await;
            } else if !last {
                warn!("{} failed ({}), waiting {:?} before retry", operation, err, wait);
                tokio::time::sleep(wait).await;
            }

            if last {
                return Err(err);
            }
            attempt += 1;
        }
    }
}
