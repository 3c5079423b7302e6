//! Token bucket ledger.
//!
//! Each key owns a bucket holding up to `requests_per_window` tokens that
//! refills continuously at `requests_per_window / window_seconds` tokens per
//! second. New buckets start full.

use dashmap::DashMap;
use tracing::debug;

use super::decision::{retry_after_secs, Decision};
use super::window::ConfigSnapshot;
use crate::error::Result;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: f64,
}

impl Bucket {
    fn refill(&mut self, now: f64, capacity: f64, rate: f64) {
        let elapsed = (now - self.last_refill).max(0.0);
        self.tokens = (self.tokens + elapsed * rate).min(capacity);
        self.last_refill = self.last_refill.max(now);
    }
}

/// Per-key token buckets.
#[derive(Debug, Default)]
pub struct TokenBucketLedger {
    buckets: DashMap<String, Bucket>,
}

impl TokenBucketLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one token from `key`'s bucket if one is available.
    pub fn evaluate(&self, key: &str, now: f64, config: &ConfigSnapshot) -> Result<Decision> {
        let capacity = config.limit() as f64;
        let rate = capacity / config.window_seconds() as f64;

        let mut bucket = match self.buckets.get_mut(key) {
            Some(bucket) => bucket,
            None => self.buckets.entry(key.to_string()).or_insert_with(|| {
                debug!(key = %key, capacity = capacity, rate = rate, "Creating token bucket");
                Bucket {
                    tokens: capacity,
                    last_refill: now,
                }
            }),
        };

        bucket.refill(now, capacity, rate);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(Decision::allow(bucket.tokens.floor() as u64));
        }

        Ok(Decision::reject(retry_after_secs(
            (1.0 - bucket.tokens) / rate,
        )))
    }

    /// Remove buckets that have been idle long enough to refill and have not
    /// been used for `retention` seconds.
    pub fn reap(&self, now: f64, config: &ConfigSnapshot, retention: f64) -> usize {
        let capacity = config.limit() as f64;
        let rate = capacity / config.window_seconds() as f64;
        let before = self.buckets.len();

        self.buckets.retain(|_, bucket| {
            let idle = now - bucket.last_refill;
            bucket.refill(now, capacity, rate);
            bucket.tokens < capacity || idle <= retention
        });

        before.saturating_sub(self.buckets.len())
    }

    /// Tokens currently in `key`'s bucket, without refilling.
    pub fn tokens(&self, key: &str) -> Option<f64> {
        self.buckets.get(key).map(|bucket| bucket.tokens)
    }

    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn clear(&self) {
        self.buckets.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::strategy::Algorithm;
    use crate::ratelimit::window::WindowConfig;

    fn snapshot(window: u64, limit: u64) -> ConfigSnapshot {
        ConfigSnapshot::initial(WindowConfig::new(window, limit).unwrap(), Algorithm::TokenBucket)
    }

    #[test]
    fn test_burst_up_to_capacity() {
        let ledger = TokenBucketLedger::new();
        let config = snapshot(10, 3);

        assert_eq!(ledger.evaluate("k", 0.0, &config).unwrap(), Decision::allow(2));
        assert_eq!(ledger.evaluate("k", 0.0, &config).unwrap(), Decision::allow(1));
        assert_eq!(ledger.evaluate("k", 0.0, &config).unwrap(), Decision::allow(0));

        let decision = ledger.evaluate("k", 0.0, &config).unwrap();
        assert!(!decision.allowed);
        // One token takes 10 / 3 seconds to refill
        assert_eq!(decision.retry_after, Some(4));
    }

    #[test]
    fn test_refills_over_time() {
        let ledger = TokenBucketLedger::new();
        let config = snapshot(10, 2);

        ledger.evaluate("k", 0.0, &config).unwrap();
        ledger.evaluate("k", 0.0, &config).unwrap();
        assert!(!ledger.evaluate("k", 1.0, &config).unwrap().allowed);

        // 0.2 tokens per second: a full token is back well before t=6
        assert!(ledger.evaluate("k", 6.0, &config).unwrap().allowed);
    }

    #[test]
    fn test_lowered_capacity_clamps_tokens() {
        let ledger = TokenBucketLedger::new();
        let wide = snapshot(10, 10);
        ledger.evaluate("k", 0.0, &wide).unwrap();

        let narrow = wide.successor(WindowConfig::new(10, 2).unwrap());
        let decision = ledger.evaluate("k", 0.0, &narrow).unwrap();
        assert_eq!(decision, Decision::allow(1));
    }

    #[test]
    fn test_reap_removes_full_idle_buckets() {
        let ledger = TokenBucketLedger::new();
        let config = snapshot(10, 2);

        ledger.evaluate("idle", 0.0, &config).unwrap();
        ledger.evaluate("busy", 99.0, &config).unwrap();

        assert_eq!(ledger.reap(100.0, &config, 30.0), 1);
        assert!(ledger.tokens("idle").is_none());
        assert!(ledger.tokens("busy").is_some());
    }
}
