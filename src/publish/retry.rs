//! Bounded retry for whole publish operations

use crate::error::RemoteError;
use std::future::Future;
use std::time::Duration;

/// Default number of attempts for a publish operation
pub const DEFAULT_ATTEMPTS: u32 = 2;

/// Default fixed delay between publish attempts
pub const DEFAULT_DELAY: Duration = Duration::from_secs(60);

/// How often and how patiently to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Retry without sleeping
    pub fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_DELAY)
    }
}

/// Run `op` until it succeeds, fails permanently or runs out of attempts
///
/// Only transient errors (see [`RemoteError::is_transient`]) are retried.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.attempts => {
                tracing::warn!(
                    attempt,
                    attempts = policy.attempts,
                    error = %e,
                    "transient failure, retrying in {:?}",
                    policy.delay
                );
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
