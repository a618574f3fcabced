//! Connection Keepalive
//!
//! Tracks WebSocket ping/pong liveness for the upstream connection.
//! The monitor is polled from the connection's select loop on a fixed
//! interval tick rather than running its own task; each tick either
//! requests a ping or reports a timeout.

use std::time::{Duration, Instant};

/// Configuration for keepalive behavior.
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Interval between ping frames.
    pub ping_interval: Duration,
    /// Time after a ping without a pong before the connection is
    /// considered dead. Checked on the next tick.
    pub pong_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(180),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

impl KeepaliveConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }
}

/// Action requested by the monitor on an interval tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveTick {
    /// Send a ping frame now.
    SendPing,
    /// No pong arrived in time; tear the connection down.
    Timeout,
}

/// Per-connection ping/pong liveness monitor.
///
/// # Example
///
/// ```rust
/// use binance_stream_hub::infrastructure::binance::keepalive::{
///     KeepaliveConfig, KeepaliveMonitor, KeepaliveTick,
/// };
///
/// let mut monitor = KeepaliveMonitor::new(KeepaliveConfig::default());
///
/// assert_eq!(monitor.on_tick(), KeepaliveTick::SendPing);
/// monitor.record_pong();
/// ```
#[derive(Debug)]
pub struct KeepaliveMonitor {
    config: KeepaliveConfig,
    last_pong: Instant,
    waiting_for_pong: bool,
}

impl KeepaliveMonitor {
    /// Create a new monitor for a fresh connection.
    #[must_use]
    pub fn new(config: KeepaliveConfig) -> Self {
        Self {
            config,
            last_pong: Instant::now(),
            waiting_for_pong: false,
        }
    }

    /// Build the interval that drives this monitor.
    ///
    /// Missed ticks are skipped so a stalled select loop does not burst
    /// pings on recovery.
    #[must_use]
    pub fn interval(&self) -> tokio::time::Interval {
        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval
    }

    /// Evaluate liveness on an interval tick.
    ///
    /// Returns `Timeout` when a previously sent ping went unanswered past
    /// the configured timeout, otherwise requests a new ping and marks
    /// the monitor as waiting.
    pub fn on_tick(&mut self) -> KeepaliveTick {
        if self.waiting_for_pong && self.last_pong.elapsed() > self.config.pong_timeout {
            return KeepaliveTick::Timeout;
        }

        self.waiting_for_pong = true;
        KeepaliveTick::SendPing
    }

    /// Record that a pong frame arrived.
    pub fn record_pong(&mut self) {
        self.last_pong = Instant::now();
        self.waiting_for_pong = false;
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub const fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong
    }

    /// Reset the monitor for a new connection.
    pub fn reset(&mut self) {
        self.last_pong = Instant::now();
        self.waiting_for_pong = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = KeepaliveConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(180));
        assert_eq!(config.pong_timeout, Duration::from_secs(60));
    }

    #[test]
    fn first_tick_requests_ping() {
        let mut monitor = KeepaliveMonitor::new(KeepaliveConfig::default());
        assert!(!monitor.is_waiting_for_pong());

        assert_eq!(monitor.on_tick(), KeepaliveTick::SendPing);
        assert!(monitor.is_waiting_for_pong());
    }

    #[test]
    fn pong_clears_waiting_state() {
        let mut monitor = KeepaliveMonitor::new(KeepaliveConfig::default());
        let _ = monitor.on_tick();
        assert!(monitor.is_waiting_for_pong());

        monitor.record_pong();
        assert!(!monitor.is_waiting_for_pong());
    }

    #[test]
    fn missed_pong_times_out() {
        let config = KeepaliveConfig::new(Duration::from_secs(180), Duration::from_millis(0));
        let mut monitor = KeepaliveMonitor::new(config);

        let _ = monitor.on_tick();
        monitor.last_pong = Instant::now() - Duration::from_millis(10);

        assert_eq!(monitor.on_tick(), KeepaliveTick::Timeout);
    }

    #[test]
    fn answered_ping_allows_next_ping() {
        let config = KeepaliveConfig::new(Duration::from_secs(180), Duration::from_millis(0));
        let mut monitor = KeepaliveMonitor::new(config);

        let _ = monitor.on_tick();
        monitor.record_pong();

        assert_eq!(monitor.on_tick(), KeepaliveTick::SendPing);
    }

    #[test]
    fn reset_clears_outstanding_ping() {
        let config = KeepaliveConfig::new(Duration::from_secs(180), Duration::from_millis(0));
        let mut monitor = KeepaliveMonitor::new(config);

        let _ = monitor.on_tick();
        monitor.last_pong = Instant::now() - Duration::from_millis(10);
        monitor.reset();

        assert_eq!(monitor.on_tick(), KeepaliveTick::SendPing);
    }
}
