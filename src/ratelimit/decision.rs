//! Admission decisions returned to callers.

use serde::{Deserialize, Serialize};

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Further admissions available before the window fills, after this one
    pub remaining: u64,
    /// Lower-bound wait in seconds; only set when rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl Decision {
    /// An admitted request with `remaining` capacity left.
    pub fn allow(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: None,
        }
    }

    /// A rejected request. `retry_after` is floored at one second.
    pub fn reject(retry_after: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after: Some(retry_after.max(1)),
        }
    }

    /// Decision used when the engine cannot decide reliably.
    pub fn fail_open() -> Self {
        Self::allow(0)
    }
}

/// Round a wait estimate in seconds up to whole seconds, with a 1 s floor.
///
/// Non-positive and non-finite estimates (clock skew, same-tick edge cases)
/// collapse to 1.
pub fn retry_after_secs(wait: f64) -> u64 {
    if !wait.is_finite() || wait <= 0.0 {
        return 1;
    }
    (wait.ceil() as u64).max(1)
}
