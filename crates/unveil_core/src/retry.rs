//! crates/unveil_core/src/retry.rs
//!
//! Exponential backoff for the one remote read that is retried: the list of
//! track ids the user has already rated.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::ports::{PortError, PortResult};

/// Retry policy implementing capped exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Cap for exponential growth.
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Backoff before retry number `retry_count` (0-based):
    /// `initial * multiplier^retry_count`, capped at `max_backoff`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry_count as i32);
        let backoff = self.initial_backoff.as_secs_f64() * factor;
        Duration::from_secs_f64(backoff.min(self.max_backoff.as_secs_f64()))
    }

    /// Not-found and auth failures will not get better by waiting.
    pub fn should_retry(&self, error: &PortError, retry_count: u32) -> bool {
        let retryable = !matches!(
            error,
            PortError::NotFound(_) | PortError::Unauthorized | PortError::Validation(_)
        );
        retryable && retry_count < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Runs `op` until it succeeds, the error is not retryable, or retries run out.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> PortResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PortResult<T>>,
{
    let mut retry_count = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if policy.should_retry(&e, retry_count) => {
                let wait = policy.backoff(retry_count);
                warn!("Attempt {} failed ({}), retrying in {:?}", retry_count + 1, e, wait);
                tokio::time::sleep(wait).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
