//! Per-site rate limiting.
//!
//! Token buckets keyed by site id, refilled at the site's configured
//! events-per-second rate. The burst capacity is a fixed multiple of the
//! rate, so short client batches pass while sustained overruns are shed.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use pulse_core::limits::RATE_BURST_MULTIPLIER;

/// Token bucket rate limiter keyed by site.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<Uuid, TokenBucket>>,
}

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(burst: u32) -> Self {
        Self {
            tokens: burst as f64,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, rate: u32, burst: u32) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        self.tokens = (self.tokens + elapsed * rate as f64).min(burst as f64);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks one event against the site's bucket. `rate` is the site's
    /// events-per-second limit; it may change between calls (directory
    /// updates) and applies from the next refill.
    pub fn check(&self, site_id: Uuid, rate: u32) -> bool {
        let burst = rate.saturating_mul(RATE_BURST_MULTIPLIER);
        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(site_id)
            .or_insert_with(|| TokenBucket::new(burst));
        bucket.try_acquire(rate, burst)
    }

    /// Drops buckets idle longer than `max_age`.
    pub fn cleanup_stale(&self, max_age: Duration) {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_update) < max_age);
    }
}

/// Shared rate limiter state.
pub type SharedRateLimiter = Arc<RateLimiter>;
