//! Retry with exponential backoff for transient network failures

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Backoff configuration for transient network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2_u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `operation`, retrying transient failures per the policy.
///
/// Non-transient errors (auth failures, local errors) propagate immediately;
/// transient ones surface as [`Error::SyncFailed`] once attempts run out.
pub async fn with_retries<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(attempt, ?delay, "Transient network error, retrying: {error}");
                tokio::time::sleep(delay).await;
            }
            Err(error) if error.is_transient() => {
                return Err(Error::SyncFailed(format!(
                    "giving up after {attempt} attempts: {error}"
                )));
            }
            Err(error) => return Err(error),
        }
    }
}
