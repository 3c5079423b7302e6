//! Error types for the Turnstile admission engine.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// A rejected admission is not an error: it is reported through
/// [`Decision::allowed`](crate::ratelimit::Decision) being `false`.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Non-positive window or limit
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Missing or malformed client identifier
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Ledger state that cannot arise under correct synchronization
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// Process configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TurnstileError {
    /// Whether the error was caused by caller input rather than engine state.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TurnstileError::InvalidConfiguration(_) | TurnstileError::InvalidRequest(_)
        )
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
