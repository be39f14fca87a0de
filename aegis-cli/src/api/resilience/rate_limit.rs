//! Rolling-window rate limiter
//!
//! Tracks request instants in a deque and suspends callers until a slot is
//! available within the configured window. The limiter is the single shared
//! mutable resource between concurrent import workers; permit acquisition is
//! serialized through its internal lock.

use super::config::RateLimitConfig;
use log::debug;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;

/// Async rolling-window rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    permits_issued: Arc<AtomicU64>,
    permits_waited: Arc<AtomicU64>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            permits_issued: Arc::new(AtomicU64::new(0)),
            permits_waited: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Suspend until a call slot is available under the rolling-window
    /// policy, then claim it.
    pub async fn acquire(&self) {
        if !self.config.enabled {
            self.permits_issued.fetch_add(1, Ordering::Relaxed);
            return;
        }

        loop {
            let sleep_for = {
                let mut stamps = self.timestamps.lock().await;
                let now = Instant::now();
                while let Some(front) = stamps.front() {
                    if now.duration_since(*front) >= self.config.window {
                        stamps.pop_front();
                    } else {
                        break;
                    }
                }

                if stamps.len() < self.config.max_calls {
                    stamps.push_back(now);
                    self.permits_issued.fetch_add(1, Ordering::Relaxed);
                    return;
                }

                // Oldest in-window call decides how long until a slot frees.
                let oldest = *stamps.front().unwrap();
                self.config.window - now.duration_since(oldest)
            };

            self.permits_waited.fetch_add(1, Ordering::Relaxed);
            debug!(
                "rate limiter: window full ({} calls), sleeping {:?}",
                self.config.max_calls, sleep_for
            );
            tokio::time::sleep(sleep_for).await;
        }
    }

    /// How many calls are available right now, without blocking.
    pub async fn remaining(&self) -> usize {
        if !self.config.enabled {
            return usize::MAX;
        }
        let stamps = self.timestamps.lock().await;
        let now = Instant::now();
        let active = stamps
            .iter()
            .filter(|t| now.duration_since(**t) < self.config.window)
            .count();
        self.config.max_calls.saturating_sub(active)
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            max_calls: self.config.max_calls,
            window: self.config.window,
            permits_issued: self.permits_issued.load(Ordering::Relaxed),
            permits_waited: self.permits_waited.load(Ordering::Relaxed),
            enabled: self.config.enabled,
        }
    }
}

/// Counters for a limiter's lifetime.
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub max_calls: usize,
    pub window: std::time::Duration,
    pub permits_issued: u64,
    pub permits_waited: u64,
    pub enabled: bool,
}
