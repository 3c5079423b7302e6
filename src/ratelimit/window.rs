//! Limit configuration and versioned snapshots.

use serde::Serialize;

use super::strategy::Algorithm;
use crate::error::{Result, TurnstileError};

/// Window size used until the first `configure` call.
pub const DEFAULT_WINDOW_SECONDS: u64 = 60;
/// Admissions per window used until the first `configure` call.
pub const DEFAULT_REQUESTS_PER_WINDOW: u64 = 100;

/// A validated `(window_seconds, requests_per_window)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowConfig {
    window_seconds: u64,
    requests_per_window: u64,
}

impl WindowConfig {
    /// Create a configuration, rejecting zero values.
    pub fn new(window_seconds: u64, requests_per_window: u64) -> Result<Self> {
        if window_seconds == 0 {
            return Err(TurnstileError::InvalidConfiguration(
                "window_seconds must be positive".to_string(),
            ));
        }
        if requests_per_window == 0 {
            return Err(TurnstileError::InvalidConfiguration(
                "requests_per_window must be positive".to_string(),
            ));
        }
        Ok(Self {
            window_seconds,
            requests_per_window,
        })
    }

    /// Create a configuration from signed input, as received from callers.
    pub fn from_signed(window_seconds: i64, requests_per_window: i64) -> Result<Self> {
        if window_seconds <= 0 {
            return Err(TurnstileError::InvalidConfiguration(format!(
                "window_seconds must be positive, got {}",
                window_seconds
            )));
        }
        if requests_per_window <= 0 {
            return Err(TurnstileError::InvalidConfiguration(format!(
                "requests_per_window must be positive, got {}",
                requests_per_window
            )));
        }
        Self::new(window_seconds as u64, requests_per_window as u64)
    }

    /// Length of the trailing window in seconds.
    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Maximum admissions per window.
    pub fn requests_per_window(&self) -> u64 {
        self.requests_per_window
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_seconds: DEFAULT_WINDOW_SECONDS,
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
        }
    }
}

/// An immutable view of the active configuration.
///
/// Snapshots are replaced wholesale; `version` increases by one on every
/// replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSnapshot {
    #[serde(flatten)]
    pub window: WindowConfig,
    pub algorithm: Algorithm,
    pub version: u64,
}

impl ConfigSnapshot {
    /// The first snapshot for an engine.
    pub fn initial(window: WindowConfig, algorithm: Algorithm) -> Self {
        Self {
            window,
            algorithm,
            version: 1,
        }
    }

    /// The snapshot that replaces `self` with new limits.
    pub fn successor(&self, window: WindowConfig) -> Self {
        Self {
            window,
            algorithm: self.algorithm,
            version: self.version + 1,
        }
    }

    pub fn window_seconds(&self) -> u64 {
        self.window.window_seconds()
    }

    pub fn limit(&self) -> u64 {
        self.window.requests_per_window()
    }
}
