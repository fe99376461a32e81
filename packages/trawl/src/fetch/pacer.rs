//! Per-target request pacing.
//!
//! Uses the governor crate for precise rate limiting. Every target key gets
//! its own limiter whose quota period is the key's minimum inter-request
//! interval with a burst of one, so two grants for the same key are never
//! closer together than that interval. Random additive jitter spreads out
//! concurrent workers of the same target.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Paces requests per target key.
///
/// `acquire` suspends the caller until the next request for the key is
/// permissible. A waiter that is dropped (cancelled) has consumed no quota
/// and does not affect other waiters' timing. Keys with a zero interval are
/// unpaced.
pub struct RequestPacer {
    default_interval: Duration,
    jitter: Option<Jitter>,
    limiters: Mutex<HashMap<String, Option<Arc<DirectLimiter>>>>,
}

impl RequestPacer {
    /// Create a pacer with a default interval and jitter bound for keys
    /// that have not been registered explicitly.
    pub fn new(default_interval: Duration, jitter_max: Duration) -> Self {
        let jitter = (!jitter_max.is_zero()).then(|| Jitter::up_to(jitter_max));
        Self {
            default_interval,
            jitter,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// A pacer that never waits. Useful in tests.
    pub fn unpaced() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Register a key with its own interval (per-target override). Replaces
    /// any limiter already associated with the key.
    pub fn register(&self, key: &str, interval: Duration) {
        let mut limiters = self.limiters.lock().expect("pacer lock poisoned");
        limiters.insert(key.to_string(), build_limiter(interval));
    }

    /// Wait until the next request for `key` is permissible.
    pub async fn acquire(&self, key: &str) {
        let limiter = {
            let mut limiters = self.limiters.lock().expect("pacer lock poisoned");
            limiters
                .entry(key.to_string())
                .or_insert_with(|| build_limiter(self.default_interval))
                .clone()
        };

        if let Some(limiter) = limiter {
            match self.jitter {
                Some(jitter) => limiter.until_ready_with_jitter(jitter).await,
                None => limiter.until_ready().await,
            }
        }
    }
}

fn build_limiter(interval: Duration) -> Option<Arc<DirectLimiter>> {
    let quota = Quota::with_period(interval)?.allow_burst(nonzero!(1u32));
    Some(Arc::new(RateLimiter::direct(quota)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_minimum_gap_between_grants() {
        let pacer = Arc::new(RequestPacer::new(Duration::from_millis(100), Duration::ZERO));

        // Randomized concurrent acquirers on the same key: grants must
        // never be closer than the interval.
        let mut handles = Vec::new();
        for _ in 0..3 {
            let pacer = pacer.clone();
            handles.push(tokio::spawn(async move {
                let mut grants = Vec::new();
                for _ in 0..3 {
                    pacer.acquire("site").await;
                    grants.push(Instant::now());
                }
                grants
            }));
        }

        let mut grants: Vec<Instant> = Vec::new();
        for handle in handles {
            grants.extend(handle.await.unwrap());
        }
        grants.sort();

        for pair in grants.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            // Allow a little slack for measuring after the grant.
            assert!(
                gap >= Duration::from_millis(80),
                "grants only {:?} apart",
                gap
            );
        }
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let pacer = RequestPacer::new(Duration::from_millis(500), Duration::ZERO);

        let start = Instant::now();
        pacer.acquire("a").await;
        pacer.acquire("b").await;
        pacer.acquire("c").await;

        // First grant per key is immediate.
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_registered_override_wins() {
        let pacer = RequestPacer::new(Duration::from_secs(5), Duration::ZERO);
        pacer.register("fast", Duration::from_millis(10));

        let start = Instant::now();
        pacer.acquire("fast").await;
        pacer.acquire("fast").await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_interval_is_unpaced() {
        let pacer = RequestPacer::unpaced();
        let start = Instant::now();
        for _ in 0..50 {
            pacer.acquire("anything").await;
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_jitter_still_respects_interval() {
        let pacer = RequestPacer::new(Duration::from_millis(60), Duration::from_millis(20));

        pacer.acquire("site").await;
        let after_first = Instant::now();
        pacer.acquire("site").await;
        let gap = after_first.elapsed();
        assert!(gap >= Duration::from_millis(40), "gap was {:?}", gap);
    }
}
