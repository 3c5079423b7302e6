//! Single entry point for the transport layer.
//!
//! The facade validates caller input, times each admission check, and feeds
//! every completed decision to the metrics aggregator.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::TurnstileConfig;
use crate::error::{Result, TurnstileError};
use crate::metrics::{ClientStats, HealthReport, MetricsAggregator};
use crate::ratelimit::{
    ClientKey, ConfigSnapshot, Decision, RateLimitEngine, WindowConfig, DEFAULT_RESOURCE,
};

/// Seconds a key may stay idle before the reaper removes it, unless configured.
pub const DEFAULT_RETENTION_SECS: u64 = 300;

/// An admission check as received from the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub client_id: String,
    #[serde(default)]
    pub resource: Option<String>,
}

impl CheckRequest {
    pub fn new(client_id: impl Into<String>, resource: Option<&str>) -> Self {
        Self {
            client_id: client_id.into(),
            resource: resource.map(str::to_string),
        }
    }
}

/// A configuration change as received from the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureRequest {
    pub window_seconds: i64,
    pub requests_per_window: i64,
}

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapSummary {
    pub ledger_keys_removed: usize,
    pub clients_forgotten: usize,
}

/// Coordinates the engine, metrics and clock behind one API.
#[derive(Debug)]
pub struct AdmissionFacade<C: Clock = SystemClock> {
    engine: RateLimitEngine,
    metrics: MetricsAggregator,
    clock: C,
    retention_secs: f64,
}

impl<C: Clock> AdmissionFacade<C> {
    /// Create a facade around `engine`, with uptime starting now.
    pub fn new(engine: RateLimitEngine, clock: C) -> Self {
        let metrics = MetricsAggregator::new(clock.now());
        Self {
            engine,
            metrics,
            clock,
            retention_secs: DEFAULT_RETENTION_SECS as f64,
        }
    }

    /// Build a facade from process configuration.
    pub fn from_config(config: &TurnstileConfig, clock: C) -> Result<Self> {
        let window = config.limits.window()?;
        let engine = RateLimitEngine::with_config(config.limits.algorithm, window);

        info!(
            algorithm = %config.limits.algorithm,
            window_seconds = window.window_seconds(),
            requests_per_window = window.requests_per_window(),
            "Admission engine initialized"
        );

        Ok(Self::new(engine, clock).with_retention(config.reaper.retention_secs))
    }

    /// Set how long idle keys are kept before reaping.
    pub fn with_retention(mut self, retention_secs: u64) -> Self {
        self.retention_secs = retention_secs as f64;
        self
    }

    /// Validate and apply new limits.
    pub fn configure(&self, request: &ConfigureRequest) -> Result<Arc<ConfigSnapshot>> {
        let window = WindowConfig::from_signed(request.window_seconds, request.requests_per_window)
            .inspect_err(|e| warn!(error = %e, "Rejected configuration change"))?;
        Ok(self.engine.apply(window))
    }

    /// Decide one request and record the outcome.
    pub fn check_request(&self, request: &CheckRequest) -> Result<Decision> {
        if request.client_id.is_empty() {
            warn!("Received admission check with empty client_id");
            return Err(TurnstileError::InvalidRequest(
                "client_id is required".to_string(),
            ));
        }

        let resource = request.resource.as_deref().unwrap_or(DEFAULT_RESOURCE);
        let key = ClientKey::new(&request.client_id, resource)
            .inspect_err(|e| warn!(error = %e, "Rejected admission check"))?;

        let started = Instant::now();
        let now = self.clock.now();
        let decision = self.engine.check(&key, now);
        let elapsed = started.elapsed();

        self.metrics.record(key.as_str(), &decision, elapsed, now);

        Ok(decision)
    }

    /// Shorthand for [`check_request`](Self::check_request).
    pub fn check(&self, client_id: &str, resource: Option<&str>) -> Result<Decision> {
        self.check_request(&CheckRequest::new(client_id, resource))
    }

    /// Current health report.
    pub fn health(&self) -> HealthReport {
        self.metrics.snapshot(self.clock.now())
    }

    /// Up to `limit` of the most recent health reports, oldest first.
    pub fn health_history(&self, limit: usize) -> Vec<HealthReport> {
        self.metrics.history(limit)
    }

    /// Remove idle keys from the ledger and the client statistics.
    pub fn reap(&self) -> ReapSummary {
        let now = self.clock.now();
        let summary = ReapSummary {
            ledger_keys_removed: self.engine.reap(now, self.retention_secs),
            clients_forgotten: self.metrics.forget_idle(now, self.retention_secs),
        };

        if summary.ledger_keys_removed > 0 || summary.clients_forgotten > 0 {
            info!(
                ledger_keys_removed = summary.ledger_keys_removed,
                clients_forgotten = summary.clients_forgotten,
                tracked_keys = self.engine.key_count(),
                "Reaped idle keys"
            );
        }
        summary
    }

    /// The active configuration snapshot.
    pub fn config(&self) -> Arc<ConfigSnapshot> {
        self.engine.config()
    }

    /// The busiest keys by total requests.
    pub fn top_clients(&self, limit: usize) -> Vec<ClientStats> {
        self.metrics.top_clients(limit)
    }

    pub fn engine(&self) -> &RateLimitEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
