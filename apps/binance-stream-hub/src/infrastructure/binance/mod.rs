//! Binance WebSocket Adapter
//!
//! Implements the upstream WebSocket client for Binance's combined
//! market data stream:
//!
//! - **Ticker**: rolling 24-hour statistics
//! - **Kline**: candlesticks, forwarded only when closed
//! - **Trade**: individual executions

pub mod client;
pub mod codec;
pub mod keepalive;
pub mod messages;
pub mod reconnect;

pub use client::{
    BinanceClient, BinanceClientConfig, BinanceClientError, SymbolCommand, UpstreamEvent,
    UpstreamHandle, combined_stream_url, stream_names,
};
pub use codec::{CodecError, JsonCodec, normalize};
pub use keepalive::{KeepaliveConfig, KeepaliveMonitor, KeepaliveTick};
pub use messages::*;
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
