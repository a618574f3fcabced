//! Binance Wire Messages
//!
//! Typed representations of the JSON frames Binance sends over its
//! combined stream, plus the live subscription control frames we send.
//!
//! Event frames carry a short `e` tag identifying the payload:
//!
//! ```json
//! {"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT","c":"65000.00","o":"64500.00",
//!  "h":"66000.00","l":"64000.00","v":"12345.6","P":"0.78"}
//! ```
//!
//! Combined-stream frames wrap the event in an envelope:
//!
//! ```json
//! {"stream":"btcusdt@ticker","data":{"e":"24hrTicker",...}}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Event Messages
// =============================================================================

/// Rolling 24-hour ticker frame (`e: "24hrTicker"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerMessage {
    /// Event time in milliseconds since epoch.
    #[serde(rename = "E")]
    pub event_time: i64,

    /// Trading pair.
    #[serde(rename = "s")]
    pub symbol: String,

    /// Last traded price.
    #[serde(rename = "c")]
    pub last_price: Decimal,

    /// Price 24 hours ago.
    #[serde(rename = "o")]
    pub open_price: Decimal,

    /// 24-hour high.
    #[serde(rename = "h")]
    pub high_price: Decimal,

    /// 24-hour low.
    #[serde(rename = "l")]
    pub low_price: Decimal,

    /// 24-hour base asset volume.
    #[serde(rename = "v")]
    pub volume: Decimal,

    /// 24-hour price change percent.
    #[serde(rename = "P")]
    pub percent_change: Decimal,
}

/// Candlestick frame (`e: "kline"`).
///
/// ```json
/// {"e":"kline","E":1700000000000,"s":"BTCUSDT",
///  "k":{"t":1699999940000,"T":1699999999999,"i":"1m","o":"64900.0",
///       "c":"65000.0","h":"65010.0","l":"64890.0","v":"3.2","x":true}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlineMessage {
    /// Event time in milliseconds since epoch.
    #[serde(rename = "E")]
    pub event_time: i64,

    /// Trading pair.
    #[serde(rename = "s")]
    pub symbol: String,

    /// Candle payload.
    #[serde(rename = "k")]
    pub kline: KlinePayload,
}

/// The nested `k` object of a kline frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlinePayload {
    /// Candle open time in milliseconds since epoch.
    #[serde(rename = "t")]
    pub open_time: i64,

    /// Candle close time in milliseconds since epoch.
    #[serde(rename = "T")]
    pub close_time: i64,

    /// Candle interval, e.g. `1m`.
    #[serde(rename = "i")]
    pub interval: String,

    /// Open price.
    #[serde(rename = "o")]
    pub open: Decimal,

    /// Close price.
    #[serde(rename = "c")]
    pub close: Decimal,

    /// High price.
    #[serde(rename = "h")]
    pub high: Decimal,

    /// Low price.
    #[serde(rename = "l")]
    pub low: Decimal,

    /// Base asset volume.
    #[serde(rename = "v")]
    pub volume: Decimal,

    /// Whether this candle is finalized. Only closed candles are
    /// forwarded downstream.
    #[serde(rename = "x")]
    pub is_closed: bool,
}

/// Executed trade frame (`e: "trade"`).
///
/// ```json
/// {"e":"trade","E":1700000000000,"s":"BTCUSDT","p":"65000.00","q":"0.01",
///  "T":1700000000000,"m":false}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Event time in milliseconds since epoch.
    #[serde(rename = "E")]
    pub event_time: i64,

    /// Trading pair.
    #[serde(rename = "s")]
    pub symbol: String,

    /// Execution price.
    #[serde(rename = "p")]
    pub price: Decimal,

    /// Executed quantity.
    #[serde(rename = "q")]
    pub quantity: Decimal,

    /// Trade time in milliseconds since epoch.
    #[serde(rename = "T")]
    pub trade_time: i64,

    /// Whether the buyer was the maker side.
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

// =============================================================================
// Control Messages
// =============================================================================

/// Acknowledgement of a live `SUBSCRIBE`/`UNSUBSCRIBE` request.
///
/// ```json
/// {"result":null,"id":1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    /// Result payload; `null` on success.
    pub result: Option<serde_json::Value>,

    /// Echo of the request id.
    pub id: u64,
}

/// Live subscription control request.
///
/// ```json
/// {"method":"SUBSCRIBE","params":["btcusdt@ticker"],"id":1}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRequest {
    /// `SUBSCRIBE` or `UNSUBSCRIBE`.
    pub method: String,

    /// Stream names, e.g. `btcusdt@ticker`.
    pub params: Vec<String>,

    /// Request id echoed back in the acknowledgement.
    pub id: u64,
}

impl StreamRequest {
    /// Build a `SUBSCRIBE` request.
    #[must_use]
    pub fn subscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: "SUBSCRIBE".to_string(),
            params,
            id,
        }
    }

    /// Build an `UNSUBSCRIBE` request.
    #[must_use]
    pub fn unsubscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: "UNSUBSCRIBE".to_string(),
            params,
            id,
        }
    }

    /// Serialize to the JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Message Union
// =============================================================================

/// Any decoded Binance frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinanceMessage {
    /// 24-hour ticker update.
    Ticker(TickerMessage),
    /// Candlestick update, closed or in progress.
    Kline(KlineMessage),
    /// Executed trade.
    Trade(TradeMessage),
    /// Control request acknowledgement.
    Ack(CommandAck),
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICKER_JSON: &str = r#"{"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT",
        "c":"65000.00","o":"64500.00","h":"66000.00","l":"64000.00",
        "v":"12345.6","P":"0.78"}"#;

    #[test]
    fn ticker_deserializes_string_decimals() {
        let msg: TickerMessage = serde_json::from_str(TICKER_JSON).unwrap();
        assert_eq!(msg.symbol, "BTCUSDT");
        assert_eq!(msg.last_price, Decimal::new(6_500_000, 2));
        assert_eq!(msg.percent_change, Decimal::new(78, 2));
        assert_eq!(msg.event_time, 1_700_000_000_000);
    }

    #[test]
    fn kline_carries_closed_flag() {
        let json = r#"{"e":"kline","E":1700000000000,"s":"ETHUSDT",
            "k":{"t":1699999940000,"T":1699999999999,"i":"1m","o":"3000.0",
                 "c":"3010.0","h":"3012.0","l":"2999.0","v":"5.5","x":true}}"#;

        let msg: KlineMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.symbol, "ETHUSDT");
        assert!(msg.kline.is_closed);
        assert_eq!(msg.kline.interval, "1m");
        assert_eq!(msg.kline.close, Decimal::new(30_100, 1));
    }

    #[test]
    fn trade_deserializes() {
        let json = r#"{"e":"trade","E":1700000000000,"s":"BTCUSDT",
            "p":"65000.00","q":"0.01","T":1700000000123,"m":false}"#;

        let msg: TradeMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.quantity, Decimal::new(1, 2));
        assert_eq!(msg.trade_time, 1_700_000_000_123);
        assert!(!msg.buyer_is_maker);
    }

    #[test]
    fn ack_deserializes_null_result() {
        let msg: CommandAck = serde_json::from_str(r#"{"result":null,"id":7}"#).unwrap();
        assert_eq!(msg.id, 7);
        assert!(msg.result.is_none());
    }

    #[test]
    fn stream_request_wire_form() {
        let request = StreamRequest::subscribe(vec!["btcusdt@ticker".to_string()], 1);
        let json = request.to_json().unwrap();
        assert!(json.contains(r#""method":"SUBSCRIBE""#));
        assert!(json.contains(r#""params":["btcusdt@ticker"]"#));
        assert!(json.contains(r#""id":1"#));

        let request = StreamRequest::unsubscribe(vec!["btcusdt@trade".to_string()], 2);
        assert_eq!(request.method, "UNSUBSCRIBE");
    }
}
