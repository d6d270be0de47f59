use std::future::Future;
use std::time::Duration;

use crate::error::CrewError;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Attempts and exponential backoff for backend calls. Only transient
/// failures (timeouts, connection errors, HTTP 429/5xx) are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: MAX_BACKOFF,
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1, 0)
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 500)
    }
}

/// Runs `op` until it succeeds, fails permanently, or the attempts run out.
/// Returns the last result and how many attempts were made.
pub async fn call_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> (Result<T, CrewError>, u32)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CrewError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return (Ok(value), attempt),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    task = label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient backend failure, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => return (Err(err), attempt),
        }
    }
}
