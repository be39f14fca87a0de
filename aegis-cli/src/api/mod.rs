//! Remote API layer
//!
//! The engines never talk HTTP directly: they consume the
//! [`RemoteResourceSource`] trait, with every failure classified into the
//! [`ApiError`] taxonomy. The concrete [`HttpResourceSource`] adds bearer
//! auth, per-call timeouts, and rolling-window rate limiting on top of
//! reqwest.

pub mod error;
pub mod resilience;
pub mod source;

pub use error::ApiError;
pub use resilience::{RateLimitConfig, RateLimiter, ResilienceConfig};
pub use source::{HttpResourceSource, RemoteResourceSource};
