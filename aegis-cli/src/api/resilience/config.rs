//! Resilience configuration for remote API operations

use std::time::Duration;

/// Global resilience configuration for a run: rate limiting, bounded
/// parallelism for import fetches, and the per-call timeout applied to every
/// remote request.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub rate_limit: RateLimitConfig,
    /// Maximum resource types fetched concurrently during an import.
    pub max_concurrent_types: usize,
    /// Per-call timeout. A timed-out call is a transient failure, never a
    /// silent success.
    pub request_timeout: Duration,
}

/// Rolling-window rate limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum calls allowed within `window`.
    pub max_calls: usize,
    /// Length of the rolling window.
    pub window: Duration,
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // Conservative: documented platform limit is 20 calls / 10 s.
        Self {
            max_calls: 15,
            window: Duration::from_secs(10),
            enabled: true,
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            max_concurrent_types: 4,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ResilienceConfig {
    /// Disable all resilience features (for tests).
    pub fn disabled() -> Self {
        Self {
            rate_limit: RateLimitConfig {
                max_calls: usize::MAX,
                window: Duration::from_secs(1),
                enabled: false,
            },
            max_concurrent_types: 1,
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResilienceConfig::default();
        assert_eq!(config.rate_limit.max_calls, 15);
        assert_eq!(config.rate_limit.window, Duration::from_secs(10));
        assert!(config.rate_limit.enabled);
        assert_eq!(config.max_concurrent_types, 4);
    }

    #[test]
    fn test_disabled_config() {
        let config = ResilienceConfig::disabled();
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.max_concurrent_types, 1);
    }
}
