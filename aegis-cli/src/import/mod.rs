//! Import engine
//!
//! Synchronizes the content cache with the remote resource source for one
//! tenant, either across all registry types (full import) or an explicit
//! subset (targeted import after a single mutation).

pub mod engine;

pub use engine::{ImportEngine, ProgressCallback};
