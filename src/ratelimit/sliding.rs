//! Sliding-window ledger of admitted-request timestamps.

use std::collections::VecDeque;

use dashmap::DashMap;
use tracing::debug;

use super::decision::{retry_after_secs, Decision};
use super::window::ConfigSnapshot;
use crate::error::{Result, TurnstileError};

/// Admitted timestamps for one key.
#[derive(Debug)]
struct WindowEntry {
    /// Admission times, oldest first
    timestamps: VecDeque<f64>,
    /// Config version in force at the latest admission
    version: u64,
    /// Last time the entry was evaluated
    last_touch: f64,
}

impl WindowEntry {
    fn new(version: u64, now: f64) -> Self {
        Self {
            timestamps: VecDeque::new(),
            version,
            last_touch: now,
        }
    }

    /// Drop every timestamp strictly older than `now - window`.
    fn prune(&mut self, now: f64, window: f64) {
        let cutoff = now - window;
        while let Some(&oldest) = self.timestamps.front() {
            if oldest >= cutoff {
                break;
            }
            self.timestamps.pop_front();
        }
    }
}

/// Per-key ordered sets of admitted timestamps.
///
/// Each key's prune, decide and append steps run while holding the map's
/// shard lock for that key, so concurrent callers on the same key are
/// serialized while different keys proceed in parallel.
#[derive(Debug, Default)]
pub struct SlidingWindowLedger {
    entries: DashMap<String, WindowEntry>,
}

impl SlidingWindowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one request for `key` at `now` and record it if admitted.
    pub fn evaluate(&self, key: &str, now: f64, config: &ConfigSnapshot) -> Result<Decision> {
        let window = config.window_seconds() as f64;
        let limit = config.limit();

        let mut entry = match self.entries.get_mut(key) {
            Some(entry) => entry,
            None => self.entries.entry(key.to_string()).or_insert_with(|| {
                debug!(key = %key, limit = limit, window = window, "Creating sliding window entry");
                WindowEntry::new(config.version, now)
            }),
        };

        entry.prune(now, window);
        entry.last_touch = now;

        let count = entry.timestamps.len() as u64;

        if count < limit {
            // A clock that steps backwards must not reorder the sequence.
            let stamp = entry.timestamps.back().map_or(now, |&last| last.max(now));
            entry.timestamps.push_back(stamp);
            entry.version = config.version;
            return Ok(Decision::allow(limit - count - 1));
        }

        if count > limit && entry.version == config.version {
            return Err(TurnstileError::InternalInconsistency(format!(
                "key {} holds {} timestamps under limit {} (config version {})",
                key, count, limit, config.version
            )));
        }

        let retry_after = match entry.timestamps.front() {
            Some(&oldest) => retry_after_secs(oldest + window - now),
            None => config.window_seconds(),
        };

        Ok(Decision::reject(retry_after))
    }

    /// Remove keys with no timestamps left in the window that have not been
    /// touched for `retention` seconds. Returns the number of removed keys.
    pub fn reap(&self, now: f64, config: &ConfigSnapshot, retention: f64) -> usize {
        let window = config.window_seconds() as f64;
        let before = self.entries.len();

        self.entries.retain(|_, entry| {
            entry.prune(now, window);
            !entry.timestamps.is_empty() || now - entry.last_touch <= retention
        });

        before.saturating_sub(self.entries.len())
    }

    /// Number of timestamps currently stored for `key`, without pruning.
    pub fn len(&self, key: &str) -> Option<usize> {
        self.entries.get(key).map(|entry| entry.timestamps.len())
    }

    /// Number of tracked keys.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, key: &str, timestamps: &[f64], version: u64) {
        let mut entry = WindowEntry::new(version, 0.0);
        entry.timestamps.extend(timestamps.iter().copied());
        self.entries.insert(key.to_string(), entry);
    }
}
