//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{
    Algorithm, WindowConfig, DEFAULT_REQUESTS_PER_WINDOW, DEFAULT_WINDOW_SECONDS,
};

/// Prefix for environment overrides, e.g. `TURNSTILE__LIMITS__WINDOW_SECONDS`.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Initial admission limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Idle key reclamation
    #[serde(default)]
    pub reaper: ReaperConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Admission limits applied at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Length of the trailing window in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Admissions allowed per window
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u64,

    /// Ledger strategy, fixed for the lifetime of the process
    #[serde(default)]
    pub algorithm: Algorithm,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            requests_per_window: default_requests_per_window(),
            algorithm: Algorithm::default(),
        }
    }
}

impl LimitsConfig {
    /// The validated window configuration.
    pub fn window(&self) -> Result<WindowConfig> {
        WindowConfig::new(self.window_seconds, self.requests_per_window)
    }
}

fn default_window_seconds() -> u64 {
    DEFAULT_WINDOW_SECONDS
}

fn default_requests_per_window() -> u64 {
    DEFAULT_REQUESTS_PER_WINDOW
}

/// Reaper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Whether the background reaper runs
    #[serde(default = "default_reaper_enabled")]
    pub enabled: bool,

    /// Seconds between reaper passes
    #[serde(default = "default_reaper_interval")]
    pub interval_secs: u64,

    /// Seconds a key must be idle before it is removed
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: default_reaper_enabled(),
            interval_secs: default_reaper_interval(),
            retention_secs: default_retention(),
        }
    }
}

fn default_reaper_enabled() -> bool {
    true
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_retention() -> u64 {
    300
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TurnstileConfig {
    /// Load configuration from a file, with `TURNSTILE__*` environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TurnstileError::Config(format!(
                "configuration file {} not found",
                path.display()
            )));
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TurnstileError::Config(e.to_string()))?;

        let config: TurnstileConfig = settings
            .try_deserialize()
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| TurnstileError::Config(e.to_string()))
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        self.limits
            .window()
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        if self.reaper.interval_secs == 0 {
            return Err(TurnstileError::Config(
                "reaper.interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
