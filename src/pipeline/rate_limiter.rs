//! Token-bucket rate limiter guarding classification calls.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

struct Bucket {
    /// Available permits. Negative values are reservations already handed
    /// to waiting callers.
    tokens: f64,
    last_refill: Instant,
}

/// Refills `permits` per `window` continuously and holds at most `burst`.
///
/// `acquire()` reserves the next free slot while holding the lock and sleeps
/// outside it, so waiters are granted in arrival order.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    per_second: f64,
    capacity: f64,
}

impl RateLimiter {
    /// Limiter that starts with a full bucket of `burst` permits.
    ///
    /// Zero arguments are clamped to the smallest working value.
    pub fn new(permits: u32, window: Duration, burst: u32) -> Self {
        let window = window.max(Duration::from_millis(1));
        let capacity = f64::from(burst.max(1));
        Self {
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            per_second: f64::from(permits.max(1)) / window.as_secs_f64(),
            capacity,
        }
    }

    /// Wait until a permit is granted.
    pub async fn acquire(&self) {
        let wait = self.reserve();
        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate limited, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a permit (possibly in the future) and return how long to wait.
    fn reserve(&self) -> Duration {
        let mut bucket = self
            .bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let refilled = bucket.tokens + elapsed.as_secs_f64() * self.per_second;
        bucket.tokens = refilled.min(self.capacity);
        bucket.last_refill = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.per_second)
        }
    }
}
