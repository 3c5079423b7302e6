//! Rate limiting logic and state management.

mod decision;
mod engine;
mod fixed;
mod key;
mod sliding;
mod strategy;
mod token_bucket;
mod window;

pub use decision::{retry_after_secs, Decision};
pub use engine::RateLimitEngine;
pub use fixed::FixedWindowLedger;
pub use key::{ClientKey, DEFAULT_RESOURCE, KEY_SEPARATOR};
pub use sliding::SlidingWindowLedger;
pub use strategy::{Algorithm, Ledger};
pub use token_bucket::TokenBucketLedger;
pub use window::{ConfigSnapshot, WindowConfig, DEFAULT_REQUESTS_PER_WINDOW, DEFAULT_WINDOW_SECONDS};
