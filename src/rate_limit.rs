use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

const MINUTE: Duration = Duration::from_secs(60);

/// Process-wide ceiling on backend requests per sliding window.
///
/// Shared by every task in a run. `None` disables the ceiling.
#[derive(Debug)]
pub struct RequestRateLimiter {
    max_requests: Option<u32>,
    window: Duration,
    sent: Mutex<VecDeque<Instant>>,
}

impl RequestRateLimiter {
    pub fn per_minute(max_rpm: Option<u32>) -> Self {
        Self::with_window(max_rpm, MINUTE)
    }

    pub fn with_window(max_requests: Option<u32>, window: Duration) -> Self {
        Self {
            max_requests: max_requests.filter(|max| *max > 0),
            window,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn max_requests(&self) -> Option<u32> {
        self.max_requests
    }

    /// Waits until a request may be submitted, then records it.
    pub async fn acquire(&self) {
        let Some(max) = self.max_requests else {
            return;
        };

        loop {
            let wait = {
                let mut sent = self.sent.lock().await;
                let now = Instant::now();
                while sent
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.window)
                {
                    sent.pop_front();
                }

                if sent.len() < max as usize {
                    sent.push_back(now);
                    return;
                }

                match sent.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            tracing::info!(
                max_requests = max,
                wait_ms = wait.as_millis() as u64,
                "request ceiling reached, waiting for a free slot"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests recorded within the current window.
    pub async fn in_window(&self) -> usize {
        let sent = self.sent.lock().await;
        let now = Instant::now();
        sent.iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}
