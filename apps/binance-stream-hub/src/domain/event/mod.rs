//! Normalized Market Events
//!
//! Venue-agnostic representations of market ticks. Every event carries the
//! symbol it refers to and the venue-reported event time. Events are
//! immutable once produced by the decode step.
//!
//! There are no sequence numbers and no replay buffer: for live-ticker
//! consumption the latest value supersedes anything missed during a
//! reconnect.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Event Payloads
// =============================================================================

/// 24-hour rolling ticker statistics for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerData {
    /// Last traded price.
    pub price: Decimal,
    /// 24-hour traded base asset volume.
    pub volume: Decimal,
    /// 24-hour high price.
    pub high: Decimal,
    /// 24-hour low price.
    pub low: Decimal,
    /// Price 24 hours ago.
    pub open: Decimal,
    /// 24-hour price change percentage.
    pub percent_change: Decimal,
}

/// One finalized candlestick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlineData {
    /// Candle open time.
    pub open_time: DateTime<Utc>,
    /// Candle close time.
    pub close_time: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Base asset volume.
    pub volume: Decimal,
}

/// One executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeData {
    /// Execution price.
    pub price: Decimal,
    /// Executed quantity.
    pub quantity: Decimal,
    /// Whether the buyer was the maker side.
    pub buyer_is_maker: bool,
}

// =============================================================================
// Normalized Event
// =============================================================================

/// A single market tick in venue-agnostic form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    /// Rolling 24-hour ticker update.
    Ticker {
        /// Uppercase trading pair, e.g. `BTCUSDT`.
        symbol: String,
        /// Ticker statistics.
        data: TickerData,
        /// Venue event time.
        timestamp: DateTime<Utc>,
    },
    /// Finalized candlestick. In-progress candles are never normalized.
    Kline {
        /// Uppercase trading pair.
        symbol: String,
        /// Candle payload.
        data: KlineData,
        /// Venue event time.
        timestamp: DateTime<Utc>,
    },
    /// Executed trade.
    Trade {
        /// Uppercase trading pair.
        symbol: String,
        /// Trade payload.
        data: TradeData,
        /// Trade time.
        timestamp: DateTime<Utc>,
    },
}

impl NormalizedEvent {
    /// Symbol this event refers to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Ticker { symbol, .. } | Self::Kline { symbol, .. } | Self::Trade { symbol, .. } => {
                symbol
            }
        }
    }

    /// Venue-reported event time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Ticker { timestamp, .. }
            | Self::Kline { timestamp, .. }
            | Self::Trade { timestamp, .. } => *timestamp,
        }
    }

    /// Stable lowercase name of the event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ticker { .. } => "ticker",
            Self::Kline { .. } => "kline",
            Self::Trade { .. } => "trade",
        }
    }
}

// =============================================================================
// Upstream Connection State
// =============================================================================

/// Lifecycle state of the single upstream venue connection.
///
/// `Unavailable` is terminal: it is entered when the reconnect budget is
/// exhausted and only an external restart leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamState {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// Dial in progress.
    Connecting,
    /// Connected and streaming.
    Connected,
    /// Connection lost, retrying with backoff.
    Reconnecting,
    /// Reconnect budget exhausted; no further attempts.
    Unavailable,
}

impl UpstreamState {
    /// Stable lowercase name for logs and health reporting.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Unavailable => "unavailable",
        }
    }

    /// Whether the connection is live.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether this state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn ticker_event() -> NormalizedEvent {
        NormalizedEvent::Ticker {
            symbol: "BTCUSDT".to_string(),
            data: TickerData {
                price: Decimal::new(65_000, 0),
                volume: Decimal::new(1234, 1),
                high: Decimal::new(66_000, 0),
                low: Decimal::new(64_000, 0),
                open: Decimal::new(64_500, 0),
                percent_change: Decimal::new(78, 2),
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn event_accessors() {
        let event = ticker_event();
        assert_eq!(event.symbol(), "BTCUSDT");
        assert_eq!(event.kind(), "ticker");
    }

    #[test_case(UpstreamState::Disconnected, "disconnected")]
    #[test_case(UpstreamState::Connecting, "connecting")]
    #[test_case(UpstreamState::Connected, "connected")]
    #[test_case(UpstreamState::Reconnecting, "reconnecting")]
    #[test_case(UpstreamState::Unavailable, "unavailable")]
    fn state_names(state: UpstreamState, expected: &str) {
        assert_eq!(state.as_str(), expected);
    }

    #[test]
    fn state_predicates() {
        assert!(UpstreamState::Connected.is_connected());
        assert!(!UpstreamState::Reconnecting.is_connected());
        assert!(UpstreamState::Unavailable.is_terminal());
        assert!(!UpstreamState::Disconnected.is_terminal());
    }

    #[test]
    fn ticker_data_serializes_decimals_as_strings() {
        let event = ticker_event();
        let NormalizedEvent::Ticker { data, .. } = event else {
            panic!("expected ticker");
        };

        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains(r#""price":"65000""#));
        assert!(json.contains(r#""percent_change":"0.78""#));
    }
}
