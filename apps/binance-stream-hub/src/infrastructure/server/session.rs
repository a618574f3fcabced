//! Downstream Client Session
//!
//! Owns one subscriber WebSocket from accept to teardown.
//!
//! # Lifecycle
//!
//! A session registers itself with the hub, then runs two pumps:
//!
//! - The **read pump** (the session task itself) parses client commands
//!   and mutates the session's own interest set.
//! - The **write pump** drains the bounded frame queue the hub delivers
//!   into, coalescing bursts into a single flush, and pings the socket
//!   when it has been idle for a full interval.
//!
//! Command acknowledgements travel through the same frame queue as
//! market data, so a client never sees an ack reordered against the
//! events it gates. Teardown is idempotent: whether the client hung up,
//! the hub shed the session, or the process is shutting down, the
//! session unregisters once and closes the socket once.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::hub::{ClientHandle, HubHandle};
use crate::domain::protocol::{ClientCommand, ServerFrame, canonical_symbol};
use crate::infrastructure::metrics;

/// Configuration for downstream sessions.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Ping the socket after this long without outbound traffic.
    pub idle_ping_interval: Duration,
    /// Capacity of the outbound frame queue.
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ping_interval: Duration::from_secs(54),
            queue_capacity: 256,
        }
    }
}

/// One downstream subscriber connection.
pub struct ClientSession {
    id: Uuid,
    hub: HubHandle,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl ClientSession {
    /// Create a session for a freshly accepted socket.
    #[must_use]
    pub fn new(hub: HubHandle, config: SessionConfig, cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            hub,
            config,
            cancel,
        }
    }

    /// Connection id of this session.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Run the session until the client disconnects, the hub sheds it,
    /// or shutdown is requested.
    pub async fn run(self, socket: WebSocket) {
        let (frame_tx, frame_rx) = mpsc::channel(self.config.queue_capacity);
        let client = ClientHandle::new(self.id, frame_tx.clone());
        let interests = Arc::clone(&client.interests);

        if self.hub.register(client).await.is_err() {
            tracing::warn!(client_id = %self.id, "Hub unavailable, refusing session");
            return;
        }

        tracing::info!(client_id = %self.id, "Client session started");

        let (ws_tx, ws_rx) = socket.split();
        let session_cancel = self.cancel.child_token();
        let mut write_task = tokio::spawn(write_pump(
            ws_tx,
            frame_rx,
            self.config.idle_ping_interval,
            session_cancel.clone(),
        ));

        let write_finished = self.read_pump(ws_rx, &interests, &frame_tx, &mut write_task).await;

        // Idempotent teardown: unregistering an already-shed id is a noop,
        // and the write pump sends at most one close frame.
        let _ = self.hub.unregister(self.id).await;
        session_cancel.cancel();
        if !write_finished {
            let _ = write_task.await;
        }

        tracing::info!(client_id = %self.id, "Client session closed");
    }

    /// Read client frames until the connection ends.
    ///
    /// Returns whether the write pump already finished (hub shed or
    /// socket error on the write side).
    async fn read_pump(
        &self,
        mut ws_rx: SplitStream<WebSocket>,
        interests: &parking_lot::RwLock<HashSet<String>>,
        frame_tx: &mpsc::Sender<ServerFrame>,
        write_task: &mut tokio::task::JoinHandle<()>,
    ) -> bool {
        loop {
            tokio::select! {
                _ = &mut *write_task => {
                    tracing::debug!(client_id = %self.id, "Write pump finished");
                    return true;
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_text(&text, interests, frame_tx).await {
                                return false;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::debug!(client_id = %self.id, "Client sent close frame");
                            return false;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            tracing::debug!(client_id = %self.id, "Ignoring binary frame");
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                            // Transport-level frames are answered by axum.
                        }
                        Some(Err(e)) => {
                            tracing::debug!(client_id = %self.id, error = %e, "Client socket error");
                            return false;
                        }
                        None => {
                            tracing::debug!(client_id = %self.id, "Client socket ended");
                            return false;
                        }
                    }
                }
            }
        }
    }

    /// Parse and apply one text frame from the client.
    ///
    /// Returns `false` when the outbound queue has closed and the
    /// session should end.
    async fn handle_text(
        &self,
        text: &str,
        interests: &parking_lot::RwLock<HashSet<String>>,
        frame_tx: &mpsc::Sender<ServerFrame>,
    ) -> bool {
        let command = match ClientCommand::parse(text) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(client_id = %self.id, error = %e, "Ignoring unparseable command");
                return true;
            }
        };

        metrics::record_client_command(command_kind(&command));

        match apply_command(command, interests) {
            Some(ack) => frame_tx.send(ack).await.is_ok(),
            None => true,
        }
    }
}

/// Apply a command to the session's interest set and build its
/// acknowledgement frame.
///
/// Returns `None` for commands that produce no acknowledgement, such as
/// a subscribe with an empty symbol.
fn apply_command(
    command: ClientCommand,
    interests: &parking_lot::RwLock<HashSet<String>>,
) -> Option<ServerFrame> {
    match command {
        ClientCommand::Subscribe { symbol } => {
            let symbol = canonical_symbol(&symbol);
            if symbol.is_empty() {
                tracing::warn!("Ignoring subscribe with empty symbol");
                return None;
            }
            interests.write().insert(symbol.clone());
            Some(ServerFrame::subscribed(symbol))
        }
        ClientCommand::Unsubscribe { symbol } => {
            let symbol = canonical_symbol(&symbol);
            if symbol.is_empty() {
                tracing::warn!("Ignoring unsubscribe with empty symbol");
                return None;
            }
            interests.write().remove(&symbol);
            Some(ServerFrame::unsubscribed(symbol))
        }
        ClientCommand::Ping => Some(ServerFrame::pong()),
    }
}

const fn command_kind(command: &ClientCommand) -> &'static str {
    match command {
        ClientCommand::Subscribe { .. } => "subscribe",
        ClientCommand::Unsubscribe { .. } => "unsubscribe",
        ClientCommand::Ping => "ping",
    }
}

/// Drain the frame queue into the socket.
///
/// Bursts are coalesced: every frame already sitting in the queue is
/// fed to the sink before a single flush. The socket is pinged after a
/// full interval with no outbound traffic.
async fn write_pump(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut frame_rx: mpsc::Receiver<ServerFrame>,
    idle_ping_interval: Duration,
    cancel: CancellationToken,
) {
    let mut ping_interval = tokio::time::interval(idle_ping_interval);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut sent_since_tick = false;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return;
            }
            _ = ping_interval.tick() => {
                if !sent_since_tick
                    && ws_tx.send(Message::Ping(Vec::new().into())).await.is_err()
                {
                    return;
                }
                sent_since_tick = false;
            }
            frame = frame_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if send_coalesced(&mut ws_tx, &mut frame_rx, frame).await.is_err() {
                            return;
                        }
                        sent_since_tick = true;
                    }
                    None => {
                        // Queue closed: the hub shed this client or is
                        // shutting down.
                        let _ = ws_tx.send(Message::Close(None)).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Feed the given frame plus everything already queued, then flush once.
async fn send_coalesced(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    frame_rx: &mut mpsc::Receiver<ServerFrame>,
    first: ServerFrame,
) -> Result<(), axum::Error> {
    feed_frame(ws_tx, &first).await?;

    while let Ok(frame) = frame_rx.try_recv() {
        feed_frame(ws_tx, &frame).await?;
    }

    ws_tx.flush().await
}

async fn feed_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    match frame.encode() {
        Ok(json) => ws_tx.feed(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!(error = %e, kind = frame.kind(), "Failed to encode frame");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interests() -> parking_lot::RwLock<HashSet<String>> {
        parking_lot::RwLock::new(HashSet::new())
    }

    #[test]
    fn subscribe_adds_canonical_symbol() {
        let interests = interests();
        let ack = apply_command(
            ClientCommand::Subscribe {
                symbol: " btcusdt ".to_string(),
            },
            &interests,
        )
        .unwrap();

        assert_eq!(ack.kind(), "subscribed");
        assert_eq!(ack.symbol(), Some("BTCUSDT"));
        assert!(interests.read().contains("BTCUSDT"));
    }

    #[test]
    fn unsubscribe_removes_symbol() {
        let interests = interests();
        interests.write().insert("BTCUSDT".to_string());

        let ack = apply_command(
            ClientCommand::Unsubscribe {
                symbol: "btcusdt".to_string(),
            },
            &interests,
        )
        .unwrap();

        assert_eq!(ack.kind(), "unsubscribed");
        assert!(interests.read().is_empty());
    }

    #[test]
    fn unsubscribe_unknown_symbol_still_acks() {
        let interests = interests();
        let ack = apply_command(
            ClientCommand::Unsubscribe {
                symbol: "ETHUSDT".to_string(),
            },
            &interests,
        );
        assert!(ack.is_some());
    }

    #[test]
    fn empty_symbol_is_ignored() {
        let interests = interests();
        let ack = apply_command(
            ClientCommand::Subscribe {
                symbol: "   ".to_string(),
            },
            &interests,
        );
        assert!(ack.is_none());
        assert!(interests.read().is_empty());
    }

    #[test]
    fn ping_yields_pong() {
        let interests = interests();
        let ack = apply_command(ClientCommand::Ping, &interests).unwrap();
        assert_eq!(ack.kind(), "pong");
    }

    #[test]
    fn command_kinds_are_stable() {
        assert_eq!(
            command_kind(&ClientCommand::Subscribe {
                symbol: "BTCUSDT".to_string()
            }),
            "subscribe"
        );
        assert_eq!(
            command_kind(&ClientCommand::Unsubscribe {
                symbol: "BTCUSDT".to_string()
            }),
            "unsubscribe"
        );
        assert_eq!(command_kind(&ClientCommand::Ping), "ping");
    }
}
