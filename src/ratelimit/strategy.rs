//! Algorithm selection.
//!
//! The set of strategies is closed: [`Ledger`] is an enum over the concrete
//! ledgers and dispatches with a `match`. Adding a strategy means adding a
//! variant and a ledger module; existing ledgers are untouched.

use serde::{Deserialize, Serialize};

use super::decision::Decision;
use super::fixed::FixedWindowLedger;
use super::sliding::SlidingWindowLedger;
use super::token_bucket::TokenBucketLedger;
use super::window::ConfigSnapshot;
use crate::error::Result;

/// Available rate limiting algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Exact trailing window over admitted timestamps
    #[default]
    SlidingWindow,
    /// Counters reset on aligned window boundaries
    FixedWindow,
    /// Continuously refilling bucket of `requests_per_window` tokens
    TokenBucket,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::SlidingWindow => "sliding_window",
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::TokenBucket => "token_bucket",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The ledger backing an engine, chosen once at startup.
#[derive(Debug)]
pub enum Ledger {
    SlidingWindow(SlidingWindowLedger),
    FixedWindow(FixedWindowLedger),
    TokenBucket(TokenBucketLedger),
}

impl Ledger {
    /// Create an empty ledger for `algorithm`.
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::SlidingWindow => Ledger::SlidingWindow(SlidingWindowLedger::new()),
            Algorithm::FixedWindow => Ledger::FixedWindow(FixedWindowLedger::new()),
            Algorithm::TokenBucket => Ledger::TokenBucket(TokenBucketLedger::new()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Ledger::SlidingWindow(_) => Algorithm::SlidingWindow,
            Ledger::FixedWindow(_) => Algorithm::FixedWindow,
            Ledger::TokenBucket(_) => Algorithm::TokenBucket,
        }
    }

    /// Decide one request for `key` at `now` under `config`.
    pub fn evaluate(&self, key: &str, now: f64, config: &ConfigSnapshot) -> Result<Decision> {
        match self {
            Ledger::SlidingWindow(ledger) => ledger.evaluate(key, now, config),
            Ledger::FixedWindow(ledger) => ledger.evaluate(key, now, config),
            Ledger::TokenBucket(ledger) => ledger.evaluate(key, now, config),
        }
    }

    /// Remove idle keys. Returns the number removed.
    pub fn reap(&self, now: f64, config: &ConfigSnapshot, retention: f64) -> usize {
        match self {
            Ledger::SlidingWindow(ledger) => ledger.reap(now, config, retention),
            Ledger::FixedWindow(ledger) => ledger.reap(now, config, retention),
            Ledger::TokenBucket(ledger) => ledger.reap(now, config, retention),
        }
    }

    pub fn key_count(&self) -> usize {
        match self {
            Ledger::SlidingWindow(ledger) => ledger.key_count(),
            Ledger::FixedWindow(ledger) => ledger.key_count(),
            Ledger::TokenBucket(ledger) => ledger.key_count(),
        }
    }

    pub fn clear(&self) {
        match self {
            Ledger::SlidingWindow(ledger) => ledger.clear(),
            Ledger::FixedWindow(ledger) => ledger.clear(),
            Ledger::TokenBucket(ledger) => ledger.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::window::WindowConfig;

    #[test]
    fn test_algorithm_serde_names() {
        assert_eq!(
            serde_json::to_value(Algorithm::SlidingWindow).unwrap(),
            "sliding_window"
        );
        let parsed: Algorithm = serde_yaml::from_str("token_bucket").unwrap();
        assert_eq!(parsed, Algorithm::TokenBucket);
        assert_eq!(Algorithm::FixedWindow.to_string(), "fixed_window");
    }

    #[test]
    fn test_ledger_matches_algorithm() {
        for algorithm in [
            Algorithm::SlidingWindow,
            Algorithm::FixedWindow,
            Algorithm::TokenBucket,
        ] {
            assert_eq!(Ledger::new(algorithm).algorithm(), algorithm);
        }
    }

    #[test]
    fn test_every_ledger_enforces_the_limit() {
        for algorithm in [
            Algorithm::SlidingWindow,
            Algorithm::FixedWindow,
            Algorithm::TokenBucket,
        ] {
            let ledger = Ledger::new(algorithm);
            let config = ConfigSnapshot::initial(WindowConfig::new(10, 3).unwrap(), algorithm);

            let admitted = (0..5)
                .map(|_| ledger.evaluate("k", 1.0, &config).unwrap())
                .filter(|d| d.allowed)
                .count();

            assert_eq!(admitted, 3, "{} admitted {}", algorithm, admitted);
            assert_eq!(ledger.key_count(), 1);

            ledger.clear();
            assert_eq!(ledger.key_count(), 0);
        }
    }
}
