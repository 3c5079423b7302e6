//! Core admission engine.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use super::decision::Decision;
use super::key::ClientKey;
use super::strategy::{Algorithm, Ledger};
use super::window::{ConfigSnapshot, WindowConfig};
use crate::error::Result;

/// The rate limit engine that owns the active configuration and ledger.
///
/// This struct is thread-safe and can be shared across threads. The active
/// configuration is an `Arc` snapshot that `configure` replaces wholesale;
/// every check clones the pointer once, so a single decision never mixes the
/// window of one configuration with the limit of another.
#[derive(Debug)]
pub struct RateLimitEngine {
    /// Active configuration snapshot
    config: RwLock<Arc<ConfigSnapshot>>,
    /// Per-key admission state
    ledger: Ledger,
}

impl RateLimitEngine {
    /// Create an engine with the default limits.
    pub fn new(algorithm: Algorithm) -> Self {
        Self::with_config(algorithm, WindowConfig::default())
    }

    /// Create an engine with explicit limits.
    pub fn with_config(algorithm: Algorithm, window: WindowConfig) -> Self {
        Self {
            config: RwLock::new(Arc::new(ConfigSnapshot::initial(window, algorithm))),
            ledger: Ledger::new(algorithm),
        }
    }

    /// Replace the active limits.
    pub fn configure(
        &self,
        window_seconds: u64,
        requests_per_window: u64,
    ) -> Result<Arc<ConfigSnapshot>> {
        let window = WindowConfig::new(window_seconds, requests_per_window)?;
        Ok(self.apply(window))
    }

    /// Replace the active limits with an already validated configuration.
    pub fn apply(&self, window: WindowConfig) -> Arc<ConfigSnapshot> {
        let mut current = self.config.write();
        let next = Arc::new(current.successor(window));
        *current = next.clone();
        drop(current);

        info!(
            window_seconds = next.window_seconds(),
            requests_per_window = next.limit(),
            version = next.version,
            "Rate limit configuration updated"
        );
        next
    }

    /// The active configuration snapshot.
    pub fn config(&self) -> Arc<ConfigSnapshot> {
        self.config.read().clone()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.ledger.algorithm()
    }

    /// Decide whether a request for `key` at `now` is admitted.
    ///
    /// Never fails: if the ledger reports an inconsistency the request is
    /// admitted and the problem is logged.
    pub fn check(&self, key: &ClientKey, now: f64) -> Decision {
        let config = self.config();

        trace!(key = %key, now = now, version = config.version, "Checking rate limit");

        match self.ledger.evaluate(key.as_str(), now, &config) {
            Ok(decision) => {
                if !decision.allowed {
                    debug!(
                        key = %key,
                        limit = config.limit(),
                        retry_after = ?decision.retry_after,
                        "Rate limit exceeded"
                    );
                }
                decision
            }
            Err(err) => {
                warn!(key = %key, error = %err, "Cannot decide admission, failing open");
                Decision::fail_open()
            }
        }
    }

    /// Remove keys idle for longer than `retention` seconds.
    pub fn reap(&self, now: f64, retention: f64) -> usize {
        let config = self.config();
        self.ledger.reap(now, &config, retention)
    }

    /// Get the number of tracked keys.
    pub fn key_count(&self) -> usize {
        self.ledger.key_count()
    }

    /// Clear all ledger state.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.ledger.clear();
    }

    #[cfg(test)]
    pub(crate) fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

impl Default for RateLimitEngine {
    fn default() -> Self {
        Self::new(Algorithm::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TurnstileError;

    fn key(client: &str, resource: &str) -> ClientKey {
        ClientKey::new(client, resource).unwrap()
    }

    #[test]
    fn test_engine_creation() {
        let engine = RateLimitEngine::default();
        assert_eq!(engine.key_count(), 0);
        assert_eq!(engine.algorithm(), Algorithm::SlidingWindow);
        assert_eq!(engine.config().window_seconds(), 60);
        assert_eq!(engine.config().limit(), 100);
    }

    #[test]
    fn test_check_creates_entry() {
        let engine = RateLimitEngine::default();
        let decision = engine.check(&key("c1", "api"), 0.0);

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 99);
        assert_eq!(engine.key_count(), 1);
    }

    #[test]
    fn test_configure_replaces_snapshot() {
        let engine = RateLimitEngine::default();
        let before = engine.config();

        let after = engine.configure(10, 3).unwrap();
        assert_eq!(after.version, before.version + 1);
        assert_eq!(engine.config().limit(), 3);

        // Snapshots held by callers are not mutated
        assert_eq!(before.limit(), 100);
    }

    #[test]
    fn test_configure_rejects_zero() {
        let engine = RateLimitEngine::default();
        assert!(matches!(
            engine.configure(0, 3),
            Err(TurnstileError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            engine.configure(10, 0),
            Err(TurnstileError::InvalidConfiguration(_))
        ));
        assert_eq!(engine.config().version, 1);
    }

    #[test]
    fn test_check_uses_new_limits() {
        let engine = RateLimitEngine::default();
        engine.configure(10, 2).unwrap();
        let k = key("c1", "api");

        assert!(engine.check(&k, 0.0).allowed);
        assert!(engine.check(&k, 0.0).allowed);
        assert!(!engine.check(&k, 0.0).allowed);
    }

    fn engine(algorithm: Algorithm, window_seconds: u64, limit: u64) -> RateLimitEngine {
        RateLimitEngine::with_config(algorithm, WindowConfig::new(window_seconds, limit).unwrap())
    }

    #[test]
    fn test_sliding_inconsistency_fails_open() {
        let engine = engine(Algorithm::SlidingWindow, 10, 2);
        let version = engine.config().version;
        let Ledger::SlidingWindow(ledger) = engine.ledger() else {
            panic!("expected a sliding window ledger");
        };
        ledger.inject("c1:api", &[0.0, 1.0, 2.0], version);

        let decision = engine.check(&key("c1", "api"), 3.0);
        assert_eq!(decision, Decision::fail_open());
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.retry_after, None);

        // The admitted request is not appended
        assert_eq!(ledger.len("c1:api"), Some(3));
    }

    #[test]
    fn test_fixed_inconsistency_fails_open() {
        let engine = engine(Algorithm::FixedWindow, 10, 2);
        let version = engine.config().version;
        let Ledger::FixedWindow(ledger) = engine.ledger() else {
            panic!("expected a fixed window ledger");
        };
        ledger.inject("c1:api", 0.0, 3, version);

        assert_eq!(engine.check(&key("c1", "api"), 3.0), Decision::fail_open());
        assert_eq!(ledger.count("c1:api"), Some(3));
    }

    #[test]
    fn test_reap_and_clear() {
        let engine = engine(Algorithm::SlidingWindow, 10, 3);
        engine.check(&key("c1", "api"), 0.0);
        engine.check(&key("c2", "api"), 500.0);

        assert_eq!(engine.reap(500.0, 60.0), 1);
        assert_eq!(engine.key_count(), 1);

        engine.clear();
        assert_eq!(engine.key_count(), 0);
    }

    #[test]
    fn test_concurrent_configure_never_tears() {
        let engine = Arc::new(RateLimitEngine::default());

        std::thread::scope(|scope| {
            let writer = engine.clone();
            scope.spawn(move || {
                for i in 1..=500u64 {
                    writer.configure(i, i).unwrap();
                }
            });

            for _ in 0..4 {
                let reader = engine.clone();
                scope.spawn(move || {
                    for _ in 0..500 {
                        let snapshot = reader.config();
                        if snapshot.version > 1 {
                            assert_eq!(snapshot.window_seconds(), snapshot.limit());
                        }
                    }
                });
            }
        });

        assert_eq!(engine.config().version, 501);
    }
}
