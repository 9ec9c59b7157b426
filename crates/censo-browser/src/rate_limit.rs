use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Process-wide minimum spacing between outbound lookups.
///
/// The lock is held while sleeping, so concurrent callers queue up behind
/// each other and each one leaves at least `min_interval` after the last.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until the minimum interval since the previous call has passed,
    /// then record this call.
    pub async fn throttle(&self) {
        let mut last_call = self.last_call.lock().await;

        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: sleeping {:.1}s", wait.as_secs_f64());
                tokio::time::sleep(wait).await;
            }
        }

        *last_call = Some(Instant::now());
    }
}
