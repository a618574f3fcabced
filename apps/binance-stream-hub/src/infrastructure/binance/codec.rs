//! Stream Codec Module
//!
//! Decodes raw Binance WebSocket text frames into typed messages and
//! normalizes them into venue-agnostic market events.
//!
//! Binance sends two frame shapes on the combined stream endpoint:
//!
//! - **Enveloped**: `{"stream":"btcusdt@ticker","data":{...}}`, where the
//!   inner object carries the event.
//! - **Bare**: `{"result":null,"id":1}` control acknowledgements and raw
//!   event objects on single-stream endpoints.
//!
//! Event objects are dispatched on their `e` tag. Decoding and
//! normalization are pure; neither touches the network.

use chrono::{DateTime, Utc};

use crate::domain::event::{KlineData, NormalizedEvent, TickerData, TradeData};
use crate::infrastructure::binance::messages::{
    BinanceMessage, CommandAck, KlineMessage, TickerMessage, TradeMessage,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown event type tag.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// Event time outside the representable range.
    #[error("invalid event timestamp: {0}")]
    InvalidTimestamp(i64),
}

/// JSON codec for the Binance combined stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a JSON text frame into a `BinanceMessage`.
    ///
    /// Combined-stream envelopes are unwrapped before dispatch; bare
    /// objects are dispatched directly.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON parsing fails, the event tag is unknown,
    /// or the frame is neither an event nor a control acknowledgement.
    pub fn decode(&self, text: &str) -> Result<BinanceMessage, CodecError> {
        let trimmed = text.trim();

        if !trimmed.starts_with('{') {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                &trimmed[..trimmed.len().min(50)]
            )));
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;

        // Unwrap the combined-stream envelope if present.
        let payload = if value.get("stream").is_some() {
            value
                .get("data")
                .cloned()
                .ok_or_else(|| CodecError::InvalidFormat("envelope without data field".to_string()))?
        } else {
            value
        };

        Self::dispatch(payload)
    }

    /// Dispatch an event object on its `e` tag.
    fn dispatch(value: serde_json::Value) -> Result<BinanceMessage, CodecError> {
        let msg_type = value.get("e").and_then(|v| v.as_str());

        match msg_type {
            Some("24hrTicker" | "ticker") => {
                let m: TickerMessage = serde_json::from_value(value)?;
                Ok(BinanceMessage::Ticker(m))
            }
            Some("kline") => {
                let m: KlineMessage = serde_json::from_value(value)?;
                Ok(BinanceMessage::Kline(m))
            }
            Some("trade") => {
                let m: TradeMessage = serde_json::from_value(value)?;
                Ok(BinanceMessage::Trade(m))
            }
            Some(other) => Err(CodecError::UnknownMessageType(other.to_string())),
            None => {
                // No event tag. Control acknowledgements carry an id field.
                if value.get("id").is_some() {
                    let m: CommandAck = serde_json::from_value(value)?;
                    Ok(BinanceMessage::Ack(m))
                } else {
                    Err(CodecError::InvalidFormat(
                        "object without event tag or request id".to_string(),
                    ))
                }
            }
        }
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

/// Convert a decoded wire message into a normalized event.
///
/// Returns `Ok(None)` for frames that carry no market data downstream:
/// control acknowledgements and in-progress candles.
///
/// # Errors
///
/// Returns an error if a venue timestamp is outside the representable
/// range.
pub fn normalize(message: BinanceMessage) -> Result<Option<NormalizedEvent>, CodecError> {
    match message {
        BinanceMessage::Ticker(m) => {
            let timestamp = millis_to_datetime(m.event_time)?;
            Ok(Some(NormalizedEvent::Ticker {
                symbol: m.symbol,
                data: TickerData {
                    price: m.last_price,
                    volume: m.volume,
                    high: m.high_price,
                    low: m.low_price,
                    open: m.open_price,
                    percent_change: m.percent_change,
                },
                timestamp,
            }))
        }
        BinanceMessage::Kline(m) => {
            if !m.kline.is_closed {
                return Ok(None);
            }
            let timestamp = millis_to_datetime(m.event_time)?;
            Ok(Some(NormalizedEvent::Kline {
                symbol: m.symbol,
                data: KlineData {
                    open_time: millis_to_datetime(m.kline.open_time)?,
                    close_time: millis_to_datetime(m.kline.close_time)?,
                    open: m.kline.open,
                    high: m.kline.high,
                    low: m.kline.low,
                    close: m.kline.close,
                    volume: m.kline.volume,
                },
                timestamp,
            }))
        }
        BinanceMessage::Trade(m) => {
            let timestamp = millis_to_datetime(m.trade_time)?;
            Ok(Some(NormalizedEvent::Trade {
                symbol: m.symbol,
                data: TradeData {
                    price: m.price,
                    quantity: m.quantity,
                    buyer_is_maker: m.buyer_is_maker,
                },
                timestamp,
            }))
        }
        BinanceMessage::Ack(_) => Ok(None),
    }
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, CodecError> {
    DateTime::from_timestamp_millis(millis).ok_or(CodecError::InvalidTimestamp(millis))
}
