//! Live traffic counters and health reporting.
//!
//! Global counters are plain atomics so recording never waits on a lock held
//! by a snapshot. Per-key statistics live in a [`DashMap`] and only contend
//! with callers on the same shard.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::ratelimit::Decision;

/// Rejection rate (percent) at or above which the service is unhealthy.
pub const UNHEALTHY_REJECTION_RATE: f64 = 50.0;
/// Rejection rate (percent) at or above which the service is degraded.
pub const DEGRADED_REJECTION_RATE: f64 = 20.0;
/// Average latency (milliseconds) above which the service is degraded.
pub const DEGRADED_LATENCY_MS: f64 = 50.0;
/// Number of past health reports kept for [`MetricsAggregator::history`].
pub const HISTORY_CAPACITY: usize = 100;

/// Overall health verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Derive the verdict from a rejection rate (percent) and average latency (ms).
    pub fn evaluate(rejection_rate: f64, avg_response_time_ms: f64) -> Self {
        if rejection_rate >= UNHEALTHY_REJECTION_RATE {
            HealthStatus::Unhealthy
        } else if rejection_rate >= DEGRADED_REJECTION_RATE
            || avg_response_time_ms > DEGRADED_LATENCY_MS
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Health and throughput figures computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub total_rejections: u64,
    pub current_rps: f64,
    pub avg_response_time_ms: f64,
    pub rejection_rate: f64,
    pub active_clients: usize,
}

/// Counters for one key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientStats {
    pub key: String,
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub rejected_requests: u64,
    pub first_seen: f64,
    pub last_seen: f64,
}

impl ClientStats {
    fn new(key: &str, now: f64) -> Self {
        Self {
            key: key.to_string(),
            total_requests: 0,
            allowed_requests: 0,
            rejected_requests: 0,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Percentage of this key's requests that were rejected.
    pub fn rejection_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        100.0 * self.rejected_requests as f64 / self.total_requests as f64
    }
}

/// Records every admission decision and derives health from the totals.
#[derive(Debug)]
pub struct MetricsAggregator {
    total_requests: AtomicU64,
    total_rejections: AtomicU64,
    latency_nanos: AtomicU64,
    start_time: RwLock<f64>,
    clients: DashMap<String, ClientStats>,
    history: Mutex<VecDeque<HealthReport>>,
}

impl MetricsAggregator {
    /// Create an aggregator whose uptime starts at `start_time`.
    pub fn new(start_time: f64) -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
            latency_nanos: AtomicU64::new(0),
            start_time: RwLock::new(start_time),
            clients: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
        }
    }

    /// Record one completed check for `key`.
    pub fn record(&self, key: &str, decision: &Decision, elapsed: Duration, now: f64) {
        // Total is bumped before rejections so a snapshot that reads
        // rejections first never sees more rejections than requests.
        self.total_requests.fetch_add(1, Ordering::SeqCst);
        if !decision.allowed {
            self.total_rejections.fetch_add(1, Ordering::SeqCst);
        }
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.latency_nanos.fetch_add(nanos, Ordering::SeqCst);

        let mut stats = match self.clients.get_mut(key) {
            Some(stats) => stats,
            None => self
                .clients
                .entry(key.to_string())
                .or_insert_with(|| ClientStats::new(key, now)),
        };
        stats.total_requests += 1;
        if decision.allowed {
            stats.allowed_requests += 1;
        } else {
            stats.rejected_requests += 1;
        }
        stats.last_seen = stats.last_seen.max(now);
    }

    /// Compute the current health report and append it to the history.
    pub fn snapshot(&self, now: f64) -> HealthReport {
        let total_rejections = self.total_rejections.load(Ordering::SeqCst);
        let total_requests = self.total_requests.load(Ordering::SeqCst);
        let latency_nanos = self.latency_nanos.load(Ordering::SeqCst);
        let uptime_seconds = (now - *self.start_time.read()).max(0.0);

        let current_rps = if uptime_seconds > 0.0 {
            total_requests as f64 / uptime_seconds
        } else {
            0.0
        };

        let (avg_response_time_ms, rejection_rate) = if total_requests > 0 {
            let avg_secs = latency_nanos as f64 / 1_000_000_000.0 / total_requests as f64;
            (
                avg_secs * 1000.0,
                100.0 * total_rejections as f64 / total_requests as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let report = HealthReport {
            status: HealthStatus::evaluate(rejection_rate, avg_response_time_ms),
            uptime_seconds,
            total_requests,
            allowed_requests: total_requests.saturating_sub(total_rejections),
            total_rejections,
            current_rps,
            avg_response_time_ms,
            rejection_rate,
            active_clients: self.clients.len(),
        };

        let mut history = self.history.lock();
        if history.len() == HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(report.clone());
        drop(history);

        report
    }

    /// Up to `limit` of the most recent health reports, oldest first.
    pub fn history(&self, limit: usize) -> Vec<HealthReport> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// Statistics for a single key.
    pub fn client(&self, key: &str) -> Option<ClientStats> {
        self.clients.get(key).map(|stats| stats.clone())
    }

    /// The `limit` busiest keys, by total requests.
    pub fn top_clients(&self, limit: usize) -> Vec<ClientStats> {
        let mut clients: Vec<ClientStats> = self
            .clients
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        clients.sort_by(|a, b| {
            b.total_requests
                .cmp(&a.total_requests)
                .then_with(|| a.key.cmp(&b.key))
        });
        clients.truncate(limit);
        clients
    }

    /// Drop statistics for keys not seen for `retention` seconds.
    pub fn forget_idle(&self, now: f64, retention: f64) -> usize {
        let before = self.clients.len();
        self.clients
            .retain(|_, stats| now - stats.last_seen <= retention);
        before.saturating_sub(self.clients.len())
    }

    /// Zero every counter and restart uptime at `now`.
    pub fn reset(&self, now: f64) {
        let mut start_time = self.start_time.write();
        self.total_requests.store(0, Ordering::SeqCst);
        self.total_rejections.store(0, Ordering::SeqCst);
        self.latency_nanos.store(0, Ordering::SeqCst);
        self.clients.clear();
        self.history.lock().clear();
        *start_time = now;
    }
}
