//! Fixed-window counter ledger.
//!
//! Windows are aligned to multiples of the window length, so every key resets
//! at the same boundaries.

use dashmap::DashMap;
use tracing::debug;

use super::decision::{retry_after_secs, Decision};
use super::window::ConfigSnapshot;
use crate::error::{Result, TurnstileError};

#[derive(Debug)]
struct FixedEntry {
    window_start: f64,
    count: u64,
    version: u64,
    last_touch: f64,
}

/// Per-key counters that reset on window boundaries.
#[derive(Debug, Default)]
pub struct FixedWindowLedger {
    entries: DashMap<String, FixedEntry>,
}

/// Start of the aligned window containing `now`.
fn window_start(now: f64, window: f64) -> f64 {
    (now / window).floor() * window
}

impl FixedWindowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one request for `key` at `now` and count it if admitted.
    pub fn evaluate(&self, key: &str, now: f64, config: &ConfigSnapshot) -> Result<Decision> {
        let window = config.window_seconds() as f64;
        let limit = config.limit();
        let start = window_start(now, window);

        let mut entry = match self.entries.get_mut(key) {
            Some(entry) => entry,
            None => self.entries.entry(key.to_string()).or_insert_with(|| {
                debug!(key = %key, limit = limit, window = window, "Creating fixed window counter");
                FixedEntry {
                    window_start: start,
                    count: 0,
                    version: config.version,
                    last_touch: now,
                }
            }),
        };

        if start > entry.window_start {
            entry.window_start = start;
            entry.count = 0;
        }
        entry.last_touch = now;

        if entry.count < limit {
            entry.count += 1;
            entry.version = config.version;
            return Ok(Decision::allow(limit - entry.count));
        }

        if entry.count > limit && entry.version == config.version {
            return Err(TurnstileError::InternalInconsistency(format!(
                "key {} counted {} requests under limit {} (config version {})",
                key, entry.count, limit, config.version
            )));
        }

        Ok(Decision::reject(retry_after_secs(entry.window_start + window - now)))
    }

    /// Remove keys whose window has closed and that have been idle for
    /// `retention` seconds.
    pub fn reap(&self, now: f64, config: &ConfigSnapshot, retention: f64) -> usize {
        let window = config.window_seconds() as f64;
        let before = self.entries.len();

        self.entries.retain(|_, entry| {
            entry.window_start + window > now || now - entry.last_touch <= retention
        });

        before.saturating_sub(self.entries.len())
    }

    /// Requests counted in the current window for `key`.
    pub fn count(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.count)
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, key: &str, window_start: f64, count: u64, version: u64) {
        self.entries.insert(
            key.to_string(),
            FixedEntry {
                window_start,
                count,
                version,
                last_touch: window_start,
            },
        );
    }
}
