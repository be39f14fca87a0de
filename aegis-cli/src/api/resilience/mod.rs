//! Resilience features for remote API operations: rolling-window rate
//! limiting and the run-level configuration (bounded parallelism, per-call
//! timeouts).

pub mod config;
pub mod rate_limit;

pub use config::{RateLimitConfig, ResilienceConfig};
pub use rate_limit::{RateLimiter, RateLimiterStats};
