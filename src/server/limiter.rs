//! Per-remote-IP token-bucket rate limiting.
//!
//! Buckets live in an idle-expiring cache keyed by remote address. Each
//! bucket holds `max_limit_events` tokens and regains one token per
//! refill interval; a connection with no token available is diverted to
//! the limit channel.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use moka::sync::Cache;

/// How long an idle bucket survives before the cache drops it.
const BUCKET_IDLE: Duration = Duration::from_secs(600);

const MAX_TRACKED_ADDRS: u64 = 100_000;

struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// Token-bucket limiter keyed by remote IP.
pub struct RateLimiter {
    buckets: Cache<IpAddr, Arc<Mutex<Bucket>>>,
    interval: Duration,
    burst: u32,
}

impl RateLimiter {
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            buckets: Cache::builder()
                .max_capacity(MAX_TRACKED_ADDRS)
                .time_to_idle(BUCKET_IDLE)
                .build(),
            interval,
            burst,
        }
    }

    /// Takes one token for `addr`. Returns `false` when the bucket is
    /// empty and the connection should be diverted.
    pub fn check(&self, addr: IpAddr) -> bool {
        let burst = self.burst;
        let bucket = self.buckets.get_with(addr, || {
            Arc::new(Mutex::new(Bucket { tokens: burst, last_refill: Instant::now() }))
        });
        let mut bucket = match bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let elapsed = bucket.last_refill.elapsed();
        if elapsed >= self.interval && !self.interval.is_zero() {
            let ticks = (elapsed.as_nanos() / self.interval.as_nanos()) as u32;
            bucket.tokens = bucket.tokens.saturating_add(ticks).min(self.burst);
            bucket.last_refill += self.interval * ticks;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn test_burst_then_limit() {
        let limiter = RateLimiter::new(Duration::from_secs(1), 1);
        assert!(limiter.check(localhost()));
        // second connection within the same interval is limited
        assert!(!limiter.check(localhost()));
    }

    #[test]
    fn test_refill() {
        let limiter = RateLimiter::new(Duration::from_millis(10), 1);
        assert!(limiter.check(localhost()));
        assert!(!limiter.check(localhost()));
        std::thread::sleep(Duration::from_millis(25));
        assert!(limiter.check(localhost()));
    }

    #[test]
    fn test_addresses_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(1), 1);
        assert!(limiter.check(localhost()));
        assert!(limiter.check("10.0.0.7".parse().unwrap()));
    }
}
