//! Token-bucket request limiter shared by every outbound data fetch.
//!
//! One instance is built per process and handed to the data adapters behind
//! an `Arc`, so the quota is global across worker threads.

use parking_lot::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    /// Tokens added per second.
    rate: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Allows `max_requests` requests per `per` window, starting full.
    pub fn new(max_requests: u32, per: Duration) -> Self {
        let capacity = f64::from(max_requests.max(1));
        let seconds = per.as_secs_f64().max(f64::EPSILON);
        Self {
            capacity,
            rate: capacity / seconds,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                refilled_at: Instant::now(),
            }),
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.refilled_at = now;
    }

    /// Takes a token if one is available.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Blocks until a token is available, then takes it.
    pub fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock();
                self.refill(&mut bucket, Instant::now());
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate)
            };
            debug!(wait_ms = wait.as_millis() as u64, "rate limited");
            thread::sleep(wait);
        }
    }
}
