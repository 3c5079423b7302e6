//! Turnstile - In-process Admission Control
//!
//! This crate decides, per client and per resource, whether a request is
//! admitted under a configurable rate limit. Decisions come from a per-key
//! sliding-window ledger (or an alternative strategy chosen at startup), and
//! every decision feeds live counters that yield a health verdict.

pub mod clock;
pub mod config;
pub mod error;
pub mod facade;
pub mod metrics;
pub mod ratelimit;
pub mod reaper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, TurnstileError};
pub use facade::{AdmissionFacade, CheckRequest, ConfigureRequest};
pub use metrics::{HealthReport, HealthStatus};
pub use ratelimit::{Algorithm, Decision, RateLimitEngine};
