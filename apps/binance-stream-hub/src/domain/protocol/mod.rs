//! Downstream Wire Protocol
//!
//! JSON frames exchanged with subscribers over WebSocket.
//!
//! # Client Commands
//!
//! ```json
//! {"type":"subscribe","symbol":"BTCUSDT"}
//! {"type":"unsubscribe","symbol":"BTCUSDT"}
//! {"type":"ping"}
//! ```
//!
//! # Server Frames
//!
//! ```json
//! {"type":"ticker","symbol":"BTCUSDT","data":{...},"timestamp":"2026-08-06T12:00:00Z"}
//! {"type":"subscribed","symbol":"BTCUSDT","timestamp":"2026-08-06T12:00:00Z"}
//! {"type":"pong","timestamp":"2026-08-06T12:00:00Z"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::event::{KlineData, NormalizedEvent, TickerData, TradeData};

// =============================================================================
// Client Commands
// =============================================================================

/// A command issued by a downstream subscriber.
///
/// Commands mutate only the issuing client's own interest set; they never
/// touch shared state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientCommand {
    /// Add a symbol to the client's interest set.
    Subscribe {
        /// Trading pair, case-insensitive.
        symbol: String,
    },
    /// Remove a symbol from the client's interest set.
    Unsubscribe {
        /// Trading pair, case-insensitive.
        symbol: String,
    },
    /// Application-level keepalive.
    Ping,
}

impl ClientCommand {
    /// Parse a command from a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a recognized command frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// =============================================================================
// Server Frames
// =============================================================================

/// A frame pushed to a downstream subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Subscription acknowledgement.
    Subscribed {
        /// Symbol added to the interest set.
        symbol: String,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// Unsubscription acknowledgement.
    Unsubscribed {
        /// Symbol removed from the interest set.
        symbol: String,
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// Reply to a client `ping` command.
    Pong {
        /// Server time.
        timestamp: DateTime<Utc>,
    },
    /// Ticker update.
    Ticker {
        /// Trading pair.
        symbol: String,
        /// Ticker statistics.
        data: TickerData,
        /// Venue event time.
        timestamp: DateTime<Utc>,
    },
    /// Finalized candlestick.
    Kline {
        /// Trading pair.
        symbol: String,
        /// Candle payload.
        data: KlineData,
        /// Venue event time.
        timestamp: DateTime<Utc>,
    },
    /// Executed trade.
    Trade {
        /// Trading pair.
        symbol: String,
        /// Trade payload.
        data: TradeData,
        /// Trade time.
        timestamp: DateTime<Utc>,
    },
}

impl ServerFrame {
    /// Acknowledgement for a completed subscribe.
    #[must_use]
    pub fn subscribed(symbol: String) -> Self {
        Self::Subscribed {
            symbol,
            timestamp: Utc::now(),
        }
    }

    /// Acknowledgement for a completed unsubscribe.
    #[must_use]
    pub fn unsubscribed(symbol: String) -> Self {
        Self::Unsubscribed {
            symbol,
            timestamp: Utc::now(),
        }
    }

    /// Reply to an application-level ping.
    #[must_use]
    pub fn pong() -> Self {
        Self::Pong {
            timestamp: Utc::now(),
        }
    }

    /// Symbol this frame refers to, if any.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Subscribed { symbol, .. }
            | Self::Unsubscribed { symbol, .. }
            | Self::Ticker { symbol, .. }
            | Self::Kline { symbol, .. }
            | Self::Trade { symbol, .. } => Some(symbol),
            Self::Pong { .. } => None,
        }
    }

    /// Stable lowercase name of the frame kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Subscribed { .. } => "subscribed",
            Self::Unsubscribed { .. } => "unsubscribed",
            Self::Pong { .. } => "pong",
            Self::Ticker { .. } => "ticker",
            Self::Kline { .. } => "kline",
            Self::Trade { .. } => "trade",
        }
    }

    /// Serialize the frame to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<NormalizedEvent> for ServerFrame {
    fn from(event: NormalizedEvent) -> Self {
        match event {
            NormalizedEvent::Ticker {
                symbol,
                data,
                timestamp,
            } => Self::Ticker {
                symbol,
                data,
                timestamp,
            },
            NormalizedEvent::Kline {
                symbol,
                data,
                timestamp,
            } => Self::Kline {
                symbol,
                data,
                timestamp,
            },
            NormalizedEvent::Trade {
                symbol,
                data,
                timestamp,
            } => Self::Trade {
                symbol,
                data,
                timestamp,
            },
        }
    }
}

/// Normalize a symbol to the canonical uppercase form used throughout
/// the hub.
#[must_use]
pub fn canonical_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
