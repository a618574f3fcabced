//! Reconnection Policy
//!
//! Linear backoff with jitter for the upstream WebSocket connection.
//! The delay ramps as `attempt * base_delay`, capped at `max_delay`,
//! and the attempt budget is bounded. Once the budget is exhausted the
//! connection is declared unavailable and no further attempts are made.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay unit; attempt `n` waits `n * base_delay`.
    pub base_delay: Duration,
    /// Cap on the ramped delay.
    pub max_delay: Duration,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.1,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        base_delay: Duration,
        max_delay: Duration,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter_factor,
            max_attempts,
        }
    }
}

/// Reconnection policy implementing bounded linear backoff with jitter.
///
/// # Example
///
/// ```rust
/// use binance_stream_hub::infrastructure::binance::reconnect::{ReconnectConfig, ReconnectPolicy};
///
/// let config = ReconnectConfig::default();
/// let mut policy = ReconnectPolicy::new(config);
///
/// // Get delay for first attempt
/// let delay1 = policy.next_delay();
/// assert!(delay1.is_some());
///
/// // Simulate successful connection
/// policy.reset();
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Get the next delay duration, applying the linear ramp with jitter.
    ///
    /// Returns `None` once the attempt budget is exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt_count >= self.config.max_attempts {
            return None;
        }

        self.attempt_count += 1;

        let ramped = self
            .config
            .base_delay
            .saturating_mul(self.attempt_count)
            .min(self.config.max_delay);

        Some(self.apply_jitter(ramped))
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.attempt_count < self.config.max_attempts
    }

    /// Apply jitter to a duration.
    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

/// Error type for reconnection failures.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxAttemptsExceeded(u32),
    /// Connection failed with reason.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay, Duration::from_secs(2));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!((config.jitter_factor - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 10);
    }

    #[test]
    fn policy_linear_ramp() {
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.0, // No jitter for predictable testing
            max_attempts: 10,
        };
        let mut policy = ReconnectPolicy::new(config);

        // First delay should be 1 * base_delay
        let d1 = policy.next_delay().unwrap();
        assert_eq!(d1, Duration::from_millis(100));

        // Second delay should be 2 * base_delay
        let d2 = policy.next_delay().unwrap();
        assert_eq!(d2, Duration::from_millis(200));

        // Third delay should be 3 * base_delay
        let d3 = policy.next_delay().unwrap();
        assert_eq!(d3, Duration::from_millis(300));

        // Fourth delay should be 4 * base_delay
        let d4 = policy.next_delay().unwrap();
        assert_eq!(d4, Duration::from_millis(400));
    }

    #[test]
    fn policy_max_delay_cap() {
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(2500),
            jitter_factor: 0.0,
            max_attempts: 10,
        };
        let mut policy = ReconnectPolicy::new(config);

        // First delay: 1000ms, second: 2000ms
        let _ = policy.next_delay();
        let _ = policy.next_delay();

        // Third delay should be capped at 2500ms (not 3000ms)
        let d3 = policy.next_delay().unwrap();
        assert_eq!(d3, Duration::from_millis(2500));

        // Fourth delay should still be capped
        let d4 = policy.next_delay().unwrap();
        assert_eq!(d4, Duration::from_millis(2500));
    }

    #[test]
    fn policy_max_attempts() {
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            jitter_factor: 0.0,
            max_attempts: 3,
        };
        let mut policy = ReconnectPolicy::new(config);

        // Should allow 3 attempts
        assert!(policy.next_delay().is_some());
        assert_eq!(policy.attempt_count(), 1);

        assert!(policy.next_delay().is_some());
        assert_eq!(policy.attempt_count(), 2);

        assert!(policy.next_delay().is_some());
        assert_eq!(policy.attempt_count(), 3);

        // Fourth attempt should fail
        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
    }

    #[test]
    fn policy_reset() {
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.0,
            max_attempts: 3,
        };
        let mut policy = ReconnectPolicy::new(config);

        // Make some attempts
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        // Reset
        policy.reset();

        // Should be back to initial state
        assert_eq!(policy.attempt_count(), 0);
        assert!(policy.should_retry());

        // Next delay should be the base delay again
        let d = policy.next_delay().unwrap();
        assert_eq!(d, Duration::from_millis(100));
    }

    #[test]
    fn policy_jitter_bounds() {
        // Run multiple times to test jitter distribution
        for _ in 0..100 {
            let mut test_policy = ReconnectPolicy::new(ReconnectConfig {
                base_delay: Duration::from_millis(1000),
                max_delay: Duration::from_secs(10),
                jitter_factor: 0.1,
                max_attempts: 10,
            });

            let delay = test_policy.next_delay().unwrap();
            let millis = delay.as_millis();

            // Should be within ±10% of 1000ms
            assert!(millis >= 900, "delay {millis}ms is below minimum 900ms");
            assert!(millis <= 1100, "delay {millis}ms is above maximum 1100ms");
        }
    }

    #[test]
    fn exhausted_policy_stays_exhausted() {
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            jitter_factor: 0.0,
            max_attempts: 2,
        };
        let mut policy = ReconnectPolicy::new(config);

        let _ = policy.next_delay();
        let _ = policy.next_delay();

        for _ in 0..10 {
            assert!(policy.next_delay().is_none());
            assert!(!policy.should_retry());
        }
    }
}
