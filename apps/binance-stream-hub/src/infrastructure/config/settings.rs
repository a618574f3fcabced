//! Hub Configuration Settings
//!
//! Configuration types for the stream hub, loaded from environment variables.

use std::time::Duration;

use crate::domain::protocol::canonical_symbol;

/// Default venue WebSocket base URL.
const DEFAULT_UPSTREAM_URL: &str = "wss://stream.binance.com:9443";

/// Symbols streamed when `STREAM_HUB_SYMBOLS` is not set.
const DEFAULT_SYMBOLS: [&str; 10] = [
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "ADAUSDT", "DOGEUSDT", "XRPUSDT", "DOTUSDT", "UNIUSDT",
    "LINKUSDT", "SOLUSDT",
];

/// Upstream venue settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Venue WebSocket base URL.
    pub url: String,
    /// Symbols to stream at startup, canonical uppercase form.
    pub symbols: Vec<String>,
    /// Kline interval, e.g. `1m`.
    pub kline_interval: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            symbols: DEFAULT_SYMBOLS.iter().map(ToString::to_string).collect(),
            kline_interval: "1m".to_string(),
        }
    }
}

/// Upstream WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Keepalive ping interval.
    pub ping_interval: Duration,
    /// Pong timeout before considering the connection dead.
    pub pong_timeout: Duration,
    /// Base reconnection delay, ramped linearly per attempt.
    pub reconnect_base_delay: Duration,
    /// Maximum reconnection delay.
    pub reconnect_max_delay: Duration,
    /// Maximum reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(180),
            pong_timeout: Duration::from_secs(60),
            reconnect_base_delay: Duration::from_secs(2),
            reconnect_max_delay: Duration::from_secs(60),
            max_reconnect_attempts: 10,
        }
    }
}

/// Fan-out channel settings.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Capacity of the hub command channel.
    pub command_capacity: usize,
    /// Capacity of each client's outbound frame queue.
    pub client_queue_capacity: usize,
    /// Ping a downstream socket after this long without traffic.
    pub idle_ping_interval: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            command_capacity: 1024,
            client_queue_capacity: 256,
            idle_ping_interval: Duration::from_secs(54),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Subscriber WebSocket port.
    pub ws_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_port: 8080,
            health_port: 8082,
        }
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone, Default)]
pub struct StreamHubConfig {
    /// Upstream venue settings.
    pub upstream: UpstreamSettings,
    /// Upstream connection settings.
    pub connection: ConnectionSettings,
    /// Fan-out channel settings.
    pub channels: ChannelSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl StreamHubConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a set environment variable is empty or
    /// yields no usable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let upstream_defaults = UpstreamSettings::default();

        let url = match std::env::var("BINANCE_WS_URL") {
            Ok(v) if v.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("BINANCE_WS_URL".to_string()));
            }
            Ok(v) => v.trim().to_string(),
            Err(_) => upstream_defaults.url,
        };

        let symbols = match std::env::var("STREAM_HUB_SYMBOLS") {
            Ok(v) => {
                let symbols = parse_symbol_list(&v);
                if symbols.is_empty() {
                    return Err(ConfigError::EmptyValue("STREAM_HUB_SYMBOLS".to_string()));
                }
                symbols
            }
            Err(_) => upstream_defaults.symbols,
        };

        let kline_interval = match std::env::var("STREAM_HUB_KLINE_INTERVAL") {
            Ok(v) if v.trim().is_empty() => {
                return Err(ConfigError::EmptyValue(
                    "STREAM_HUB_KLINE_INTERVAL".to_string(),
                ));
            }
            Ok(v) => v.trim().to_string(),
            Err(_) => upstream_defaults.kline_interval,
        };

        let connection = ConnectionSettings {
            ping_interval: parse_env_duration_secs(
                "STREAM_HUB_UPSTREAM_PING_INTERVAL_SECS",
                ConnectionSettings::default().ping_interval,
            ),
            pong_timeout: parse_env_duration_secs(
                "STREAM_HUB_UPSTREAM_PONG_TIMEOUT_SECS",
                ConnectionSettings::default().pong_timeout,
            ),
            reconnect_base_delay: parse_env_duration_millis(
                "STREAM_HUB_RECONNECT_BASE_DELAY_MS",
                ConnectionSettings::default().reconnect_base_delay,
            ),
            reconnect_max_delay: parse_env_duration_secs(
                "STREAM_HUB_RECONNECT_MAX_DELAY_SECS",
                ConnectionSettings::default().reconnect_max_delay,
            ),
            max_reconnect_attempts: parse_env_u32(
                "STREAM_HUB_MAX_RECONNECT_ATTEMPTS",
                ConnectionSettings::default().max_reconnect_attempts,
            ),
        };

        let channels = ChannelSettings {
            command_capacity: parse_env_usize(
                "STREAM_HUB_COMMAND_CAPACITY",
                ChannelSettings::default().command_capacity,
            ),
            client_queue_capacity: parse_env_usize(
                "STREAM_HUB_QUEUE_CAPACITY",
                ChannelSettings::default().client_queue_capacity,
            ),
            idle_ping_interval: parse_env_duration_secs(
                "STREAM_HUB_IDLE_PING_SECS",
                ChannelSettings::default().idle_ping_interval,
            ),
        };

        let server = ServerSettings {
            ws_port: parse_env_u16("STREAM_HUB_WS_PORT", ServerSettings::default().ws_port),
            health_port: parse_env_u16(
                "STREAM_HUB_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self {
            upstream: UpstreamSettings {
                url,
                symbols,
                kline_interval,
            },
            connection,
            channels,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable is set but yields no usable value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

/// Split a comma-separated symbol list into canonical symbols.
///
/// Empty entries are dropped and duplicates are kept once, preserving
/// first-seen order.
fn parse_symbol_list(raw: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for entry in raw.split(',') {
        let symbol = canonical_symbol(entry);
        if !symbol.is_empty() && !seen.contains(&symbol) {
            seen.push(symbol);
        }
    }
    seen
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
