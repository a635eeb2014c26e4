//! Rate Limiter
//!
//! Token bucket shared by every conversation in the process. Each reasoning
//! step consumes one token; when the bucket is empty the caller suspends
//! until refill. Waiters are served FIFO by arrival, so no conversation is
//! starved.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Shared token-bucket gate on reasoning-step calls
pub struct RateLimiter {
    inner: Mutex<Bucket>,
    capacity: f64,
    refill_per_sec: f64,
}

impl RateLimiter {
    /// Create a bucket with burst capacity `capacity`, refilling at
    /// `refill_per_sec` tokens per second. The bucket starts full.
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        assert!(refill_per_sec > 0.0, "refill rate must be positive");

        Self {
            inner: Mutex::new(Bucket {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
            capacity: f64::from(capacity),
            refill_per_sec,
        }
    }

    /// Consume one token, suspending until one is available.
    ///
    /// This is a bounded wait, never a failure. The tokio mutex queues
    /// waiters fairly, which gives FIFO ordering across conversations.
    pub async fn acquire(&self) {
        let mut bucket = self.inner.lock().await;

        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            bucket.last_refill = now;

            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                return;
            }

            let deficit = 1.0 - bucket.tokens;
            let wait = Duration::from_secs_f64(deficit / self.refill_per_sec);
            tokio::time::sleep(wait).await;
        }
    }
}
