//! Binance WebSocket Client
//!
//! Maintains the single upstream connection to Binance's combined stream
//! for real-time market data including tickers, trades, and klines.
//!
//! # Stream URL
//!
//! `wss://stream.binance.com:9443/stream?streams=btcusdt@ticker/btcusdt@kline_1m/btcusdt@trade`
//!
//! # Protocol
//!
//! Messages are JSON objects wrapped in a combined-stream envelope.
//! Subscription changes after connect use `SUBSCRIBE`/`UNSUBSCRIBE`
//! control frames acknowledged by id.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::domain::event::NormalizedEvent;
use crate::domain::protocol::canonical_symbol;
use crate::infrastructure::metrics;

use super::codec::{CodecError, JsonCodec, normalize};
use super::keepalive::{KeepaliveConfig, KeepaliveMonitor, KeepaliveTick};
use super::messages::{BinanceMessage, StreamRequest};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the Binance client.
#[derive(Debug, thiserror::Error)]
pub enum BinanceClientError {
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,
}

// =============================================================================
// Client Events
// =============================================================================

/// Events emitted by the Binance client.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    /// Successfully connected and streaming.
    Connected,
    /// Disconnected from the venue.
    Disconnected,
    /// Reconnecting to the venue.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Reconnect budget exhausted; the client will not retry.
    Unavailable,
    /// Received a normalized market event.
    Event(NormalizedEvent),
}

// =============================================================================
// Symbol Commands
// =============================================================================

/// Live subscription change requested while the client is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolCommand {
    /// Start streaming a symbol.
    Subscribe(String),
    /// Stop streaming a symbol.
    Unsubscribe(String),
}

/// Handle for requesting subscription changes on a running client.
#[derive(Debug, Clone)]
pub struct UpstreamHandle {
    control_tx: mpsc::Sender<SymbolCommand>,
}

impl UpstreamHandle {
    /// Request streaming for a symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has shut down.
    pub async fn subscribe(&self, symbol: &str) -> Result<(), BinanceClientError> {
        self.control_tx
            .send(SymbolCommand::Subscribe(canonical_symbol(symbol)))
            .await
            .map_err(|_| BinanceClientError::ConnectionClosed)
    }

    /// Stop streaming a symbol.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has shut down.
    pub async fn unsubscribe(&self, symbol: &str) -> Result<(), BinanceClientError> {
        self.control_tx
            .send(SymbolCommand::Unsubscribe(canonical_symbol(symbol)))
            .await
            .map_err(|_| BinanceClientError::ConnectionClosed)
    }
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the Binance client.
#[derive(Debug, Clone)]
pub struct BinanceClientConfig {
    /// Base WebSocket URL, e.g. `wss://stream.binance.com:9443`.
    pub url: String,
    /// Symbols to stream at startup, canonical uppercase form.
    pub symbols: Vec<String>,
    /// Kline interval, e.g. `1m`.
    pub kline_interval: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Keepalive configuration.
    pub keepalive: KeepaliveConfig,
}

impl BinanceClientConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(url: String, symbols: Vec<String>, kline_interval: String) -> Self {
        Self {
            url,
            symbols,
            kline_interval,
            reconnect: ReconnectConfig::default(),
            keepalive: KeepaliveConfig::default(),
        }
    }
}

/// Build the per-symbol stream names for one symbol.
///
/// Binance stream names are lowercase: `btcusdt@ticker`,
/// `btcusdt@kline_1m`, `btcusdt@trade`.
#[must_use]
pub fn stream_names(symbol: &str, kline_interval: &str) -> Vec<String> {
    let lower = symbol.to_lowercase();
    vec![
        format!("{lower}@ticker"),
        format!("{lower}@kline_{kline_interval}"),
        format!("{lower}@trade"),
    ]
}

/// Build the combined-stream connection URL for a symbol set.
#[must_use]
pub fn combined_stream_url(base_url: &str, symbols: &BTreeSet<String>, kline_interval: &str) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .flat_map(|s| stream_names(s, kline_interval))
        .collect();
    format!("{}/stream?streams={}", base_url, streams.join("/"))
}

// =============================================================================
// Binance Client
// =============================================================================

/// Binance WebSocket client for market data.
///
/// Manages the connection lifecycle including:
/// - Keepalive monitoring
/// - Automatic reconnection with bounded linear backoff
/// - Live subscription management
pub struct BinanceClient {
    config: BinanceClientConfig,
    codec: JsonCodec,
    event_tx: mpsc::Sender<UpstreamEvent>,
    cancel: CancellationToken,
    symbols: parking_lot::RwLock<BTreeSet<String>>,
    control_tx: mpsc::Sender<SymbolCommand>,
    control_rx: tokio::sync::Mutex<mpsc::Receiver<SymbolCommand>>,
    next_request_id: AtomicU64,
}

impl BinanceClient {
    /// Create a new Binance client.
    #[must_use]
    pub fn new(
        config: BinanceClientConfig,
        event_tx: mpsc::Sender<UpstreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let symbols = config
            .symbols
            .iter()
            .map(|s| canonical_symbol(s))
            .collect::<BTreeSet<String>>();
        let (control_tx, control_rx) = mpsc::channel(32);

        Self {
            config,
            codec: JsonCodec::new(),
            event_tx,
            cancel,
            symbols: parking_lot::RwLock::new(symbols),
            control_tx,
            control_rx: tokio::sync::Mutex::new(control_rx),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Handle for live subscription changes.
    #[must_use]
    pub fn handle(&self) -> UpstreamHandle {
        UpstreamHandle {
            control_tx: self.control_tx.clone(),
        }
    }

    /// Symbols currently streamed.
    #[must_use]
    pub fn symbols(&self) -> BTreeSet<String> {
        self.symbols.read().clone()
    }

    /// Run the client connection loop.
    ///
    /// Connects to the combined stream and processes messages until
    /// cancelled or the reconnect budget is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error when the reconnect budget is exhausted.
    pub async fn run(self: Arc<Self>) -> Result<(), BinanceClientError> {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Binance client cancelled");
                return Ok(());
            }

            match self.connect_and_run(&mut reconnect_policy).await {
                Ok(()) => {
                    tracing::info!("Binance connection closed gracefully");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Binance connection error");

                    let _ = self.event_tx.send(UpstreamEvent::Disconnected).await;

                    if let Some(delay) = reconnect_policy.next_delay() {
                        let attempt = reconnect_policy.attempt_count();
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Reconnecting to Binance stream"
                        );

                        let _ = self
                            .event_tx
                            .send(UpstreamEvent::Reconnecting { attempt })
                            .await;

                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                tracing::info!("Binance client cancelled during reconnect delay");
                                return Ok(());
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        let _ = self.event_tx.send(UpstreamEvent::Unavailable).await;
                        return Err(BinanceClientError::MaxReconnectAttemptsExceeded);
                    }
                }
            }
        }
    }

    /// Connect to the combined stream and run until error or cancellation.
    async fn connect_and_run(
        &self,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<(), BinanceClientError> {
        let url = {
            let symbols = self.symbols.read();
            if symbols.is_empty() {
                return Err(BinanceClientError::ConnectionFailed(
                    "no symbols configured".to_string(),
                ));
            }
            combined_stream_url(&self.config.url, &symbols, &self.config.kline_interval)
        };

        tracing::info!(url = %url, "Connecting to Binance stream");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&url).await?;
        let (mut write, mut read) = ws_stream.split();

        // The handshake succeeded; the attempt budget starts over.
        reconnect_policy.reset();
        let _ = self.event_tx.send(UpstreamEvent::Connected).await;

        let mut keepalive = KeepaliveMonitor::new(self.config.keepalive.clone());
        let mut keepalive_interval = keepalive.interval();

        let mut control_rx = self.control_rx.lock().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = keepalive_interval.tick() => {
                    match keepalive.on_tick() {
                        KeepaliveTick::SendPing => {
                            write.send(Message::Ping(vec![].into())).await?;
                        }
                        KeepaliveTick::Timeout => {
                            tracing::warn!("Keepalive timeout");
                            return Err(BinanceClientError::ConnectionClosed);
                        }
                    }
                }
                command = control_rx.recv() => {
                    match command {
                        Some(command) => {
                            self.apply_symbol_command(command, &mut write).await?;
                        }
                        None => {
                            tracing::debug!("Control channel closed");
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            keepalive.record_pong();
                            self.handle_text_message(&text).await;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            keepalive.record_pong();
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Venue sent close frame");
                            return Err(BinanceClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Ignore other message types
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            return Err(BinanceClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Handle a text frame from the venue.
    ///
    /// Malformed frames are logged and skipped; a single bad frame never
    /// tears down the connection.
    async fn handle_text_message(&self, text: &str) {
        let message = match self.codec.decode(text) {
            Ok(message) => message,
            Err(e) => {
                metrics::record_decode_error();
                tracing::warn!(error = %e, "Skipping undecodable frame");
                return;
            }
        };

        if let BinanceMessage::Ack(ack) = &message {
            tracing::debug!(id = ack.id, "Subscription change acknowledged");
            return;
        }

        match normalize(message) {
            Ok(Some(event)) => {
                let _ = self.event_tx.send(UpstreamEvent::Event(event)).await;
            }
            Ok(None) => {
                // In-progress candle; nothing to forward.
            }
            Err(e) => {
                metrics::record_decode_error();
                tracing::warn!(error = %e, "Skipping unnormalizable frame");
            }
        }
    }

    /// Apply a live subscription change on the open connection.
    async fn apply_symbol_command<W>(
        &self,
        command: SymbolCommand,
        write: &mut W,
    ) -> Result<(), BinanceClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let request = match command {
            SymbolCommand::Subscribe(symbol) => {
                let inserted = self.symbols.write().insert(symbol.clone());
                if !inserted {
                    return Ok(());
                }
                tracing::info!(symbol = %symbol, "Adding upstream streams");
                StreamRequest::subscribe(
                    stream_names(&symbol, &self.config.kline_interval),
                    self.next_request_id(),
                )
            }
            SymbolCommand::Unsubscribe(symbol) => {
                let removed = self.symbols.write().remove(&symbol);
                if !removed {
                    return Ok(());
                }
                tracing::info!(symbol = %symbol, "Removing upstream streams");
                StreamRequest::unsubscribe(
                    stream_names(&symbol, &self.config.kline_interval),
                    self.next_request_id(),
                )
            }
        };

        let json = request
            .to_json()
            .map_err(|e| BinanceClientError::ConnectionFailed(format!(
                "failed to serialize subscription request: {e}"
            )))?;

        write.send(Message::Text(json.into())).await.map_err(|e| {
            BinanceClientError::ConnectionFailed(format!("failed to send subscription request: {e}"))
        })?;

        Ok(())
    }

    fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }
}
