//! Token-bucket rate limiting for the dispatch kernel's slot engine (§4.5):
//! per-slot limiters plus a service-wide fallback, with cooperative blocking
//! instead of outright rejection — invocation awaits a token rather than
//! failing when the bucket is empty.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Refill tokens based on elapsed time and try to consume one.
/// Returns `true` if a token was consumed, `false` if none is available yet.
#[inline]
fn refill_and_try_consume(
    tokens: &mut f64,
    last_refill: &mut Instant,
    max_tokens: f64,
    window: Duration,
) -> bool {
    let now = Instant::now();
    let elapsed = now.duration_since(*last_refill);
    let refill = (elapsed.as_secs_f64() / window.as_secs_f64()) * max_tokens;
    *tokens = (*tokens + refill).min(max_tokens);
    *last_refill = now;

    if *tokens >= 1.0 {
        *tokens -= 1.0;
        true
    } else {
        false
    }
}

/// A token-bucket rate limiter keyed by an arbitrary type.
///
/// Each key gets its own independent bucket. Tokens refill at a constant rate.
#[derive(Clone)]
pub struct RateLimiter<K> {
    buckets: Arc<DashMap<K, TokenBucket>>,
    max_tokens: f64,
    window: Duration,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    /// Create a rate limiter that allows `max` requests per `window`.
    pub fn new(max: u64, window: Duration) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            max_tokens: max as f64,
            window,
        }
    }

    /// Try to consume one token for the given key. Non-blocking.
    pub fn try_acquire(&self, key: &K) -> bool {
        let mut entry = self.buckets.entry(key.clone()).or_insert_with(|| TokenBucket {
            tokens: self.max_tokens,
            last_refill: Instant::now(),
        });

        let bucket = entry.value_mut();
        refill_and_try_consume(&mut bucket.tokens, &mut bucket.last_refill, self.max_tokens, self.window)
    }

    /// Awaits until a token is available for `key`, polling at a fraction of
    /// the refill window. Blocks only the calling task — other requests to
    /// other keys proceed independently (§5: "Token acquisition is
    /// cooperative — it blocks only the caller").
    pub async fn acquire(&self, key: &K) {
        let poll_interval = (self.window / (self.max_tokens.max(1.0) as u32 + 1)).max(Duration::from_millis(1));
        while !self.try_acquire(key) {
            tokio::time::sleep(poll_interval).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Pluggable, heterogeneously-configured backend (per-slot / per-service caps
// with differing rps, keyed by an opaque string such as "service.slot").
// ---------------------------------------------------------------------------

/// Per-key bucket with heterogeneous max/window, used when different keys
/// need different rates (service-wide cap vs. per-slot overrides).
struct ConfiguredBucket {
    tokens: f64,
    max_tokens: f64,
    window: Duration,
    last_refill: Instant,
}

/// In-memory token-bucket backend. Each key gets its own bucket whose
/// max/window are determined by the first call for that key.
#[derive(Clone, Default)]
pub struct InMemoryRateLimiter {
    buckets: Arc<DashMap<String, ConfiguredBucket>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking attempt.
    pub fn try_acquire(&self, key: &str, max: u64, window_secs: u64) -> bool {
        let max_tokens = max as f64;
        let window = Duration::from_secs(window_secs.max(1));

        let mut entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| ConfiguredBucket {
                tokens: max_tokens,
                max_tokens,
                window,
                last_refill: Instant::now(),
            });

        let bucket = entry.value_mut();
        refill_and_try_consume(&mut bucket.tokens, &mut bucket.last_refill, bucket.max_tokens, bucket.window)
    }

    /// Blocking (cooperative await) variant used by the slot invocation path.
    pub async fn acquire(&self, key: &str, max: u64, window_secs: u64) {
        let poll_interval = Duration::from_secs(window_secs.max(1)) / (max.max(1) as u32 + 1);
        let poll_interval = poll_interval.max(Duration::from_millis(1));
        while !self.try_acquire(key, max, window_secs) {
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_keys_do_not_share_buckets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(1));
        assert!(limiter.try_acquire(&"a"));
        assert!(!limiter.try_acquire(&"a"));
        assert!(limiter.try_acquire(&"b"));
    }

    #[tokio::test]
    async fn acquire_eventually_unblocks_after_refill() {
        let limiter = InMemoryRateLimiter::new();
        assert!(limiter.try_acquire("slot", 1, 1));
        assert!(!limiter.try_acquire("slot", 1, 1));
        tokio::time::timeout(Duration::from_secs(2), limiter.acquire("slot", 1, 1))
            .await
            .expect("acquire should unblock once the bucket refills");
    }
}
