//! Fan-Out Hub
//!
//! Distributes normalized market events to downstream subscribers.
//!
//! # Architecture
//!
//! The hub runs a single control loop that owns the client registry.
//! Registration, removal, and broadcast all arrive as commands on one
//! mpsc channel, so registry access is serialized without locks.
//!
//! Each client has a bounded outbound queue. Broadcast delivery uses
//! `try_send`: a full queue means the client is too slow to keep up with
//! live data, and the hub sheds it rather than buffering or blocking.
//! Delivery is at most once; there is no replay.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::event::NormalizedEvent;
use crate::domain::protocol::ServerFrame;
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for hub channel capacities.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Capacity of the hub command channel.
    pub command_capacity: usize,
    /// Capacity of each client's outbound frame queue.
    pub client_queue_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_capacity: 1024,
            client_queue_capacity: 256,
        }
    }
}

// =============================================================================
// Client Handle
// =============================================================================

/// A downstream client as seen by the hub.
///
/// The session owning the client updates the interest set; the hub only
/// reads it at broadcast time.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Unique connection id.
    pub id: Uuid,
    /// Symbols the client wants, canonical uppercase form. An empty set
    /// means every symbol.
    pub interests: Arc<parking_lot::RwLock<HashSet<String>>>,
    /// Bounded outbound frame queue feeding the client's write pump.
    pub tx: mpsc::Sender<ServerFrame>,
}

impl ClientHandle {
    /// Create a handle with an empty interest set.
    #[must_use]
    pub fn new(id: Uuid, tx: mpsc::Sender<ServerFrame>) -> Self {
        Self {
            id,
            interests: Arc::new(parking_lot::RwLock::new(HashSet::new())),
            tx,
        }
    }

    /// Whether the client should receive events for a symbol.
    #[must_use]
    pub fn is_interested(&self, symbol: &str) -> bool {
        let interests = self.interests.read();
        interests.is_empty() || interests.contains(symbol)
    }
}

// =============================================================================
// Commands and Errors
// =============================================================================

/// A command processed by the hub control loop.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a client to the registry.
    Register(ClientHandle),
    /// Remove a client from the registry.
    Unregister(Uuid),
    /// Fan an event out to interested clients.
    Broadcast(NormalizedEvent),
}

/// Errors returned by hub handle operations.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub control loop has stopped.
    #[error("hub command channel closed")]
    ChannelClosed,
}

// =============================================================================
// Shared State and Handle
// =============================================================================

/// Counters shared between the hub loop and its handles.
#[derive(Debug, Default)]
pub struct HubShared {
    connected_clients: AtomicUsize,
    events_broadcast: AtomicU64,
    frames_sent: AtomicU64,
    clients_shed: AtomicU64,
}

/// Snapshot of hub counters.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct HubStats {
    /// Currently registered clients.
    pub connected_clients: usize,
    /// Events fanned out since startup.
    pub events_broadcast: u64,
    /// Frames delivered to client queues since startup.
    pub frames_sent: u64,
    /// Clients shed for falling behind since startup.
    pub clients_shed: u64,
}

/// Cloneable handle for submitting commands to the hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    command_tx: mpsc::Sender<HubCommand>,
    shared: Arc<HubShared>,
}

impl HubHandle {
    /// Register a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn register(&self, client: ClientHandle) -> Result<(), HubError> {
        self.command_tx
            .send(HubCommand::Register(client))
            .await
            .map_err(|_| HubError::ChannelClosed)
    }

    /// Unregister a client. Safe to call for ids the hub already shed.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn unregister(&self, id: Uuid) -> Result<(), HubError> {
        self.command_tx
            .send(HubCommand::Unregister(id))
            .await
            .map_err(|_| HubError::ChannelClosed)
    }

    /// Fan an event out to all interested clients.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub has stopped.
    pub async fn broadcast(&self, event: NormalizedEvent) -> Result<(), HubError> {
        self.command_tx
            .send(HubCommand::Broadcast(event))
            .await
            .map_err(|_| HubError::ChannelClosed)
    }

    /// Number of currently registered clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.shared.connected_clients.load(Ordering::Relaxed)
    }

    /// Snapshot of hub counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connected_clients: self.shared.connected_clients.load(Ordering::Relaxed),
            events_broadcast: self.shared.events_broadcast.load(Ordering::Relaxed),
            frames_sent: self.shared.frames_sent.load(Ordering::Relaxed),
            clients_shed: self.shared.clients_shed.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Hub
// =============================================================================

/// The fan-out control loop.
///
/// # Example
///
/// ```rust,no_run
/// use binance_stream_hub::application::hub::{Hub, HubConfig};
/// use tokio_util::sync::CancellationToken;
///
/// let (hub, handle) = Hub::new(HubConfig::default(), CancellationToken::new());
/// tokio::spawn(hub.run());
/// // handle.register(...) / handle.broadcast(...)
/// ```
#[derive(Debug)]
pub struct Hub {
    clients: HashMap<Uuid, ClientHandle>,
    command_rx: mpsc::Receiver<HubCommand>,
    shared: Arc<HubShared>,
    cancel: CancellationToken,
}

impl Hub {
    /// Create a hub and its command handle.
    #[must_use]
    pub fn new(config: HubConfig, cancel: CancellationToken) -> (Self, HubHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let shared = Arc::new(HubShared::default());

        let hub = Self {
            clients: HashMap::new(),
            command_rx,
            shared: shared.clone(),
            cancel,
        };
        let handle = HubHandle { command_tx, shared };

        (hub, handle)
    }

    /// Run the control loop until cancelled or all handles are dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!(clients = self.clients.len(), "Hub cancelled");
                    break;
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            tracing::debug!("Hub command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Dropping the registry closes every client queue, which the
        // sessions observe as shutdown.
        self.clients.clear();
        self.publish_client_count();
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(client) => {
                tracing::info!(client_id = %client.id, "Client registered");
                self.clients.insert(client.id, client);
                self.publish_client_count();
            }
            HubCommand::Unregister(id) => {
                if self.clients.remove(&id).is_some() {
                    tracing::info!(client_id = %id, "Client unregistered");
                    self.publish_client_count();
                }
            }
            HubCommand::Broadcast(event) => self.broadcast(&event),
        }
    }

    /// Deliver one event to every interested client.
    ///
    /// The frame is encoded into its downstream form once and cloned per
    /// recipient. Clients whose queues are full are shed.
    fn broadcast(&mut self, event: &NormalizedEvent) {
        self.shared.events_broadcast.fetch_add(1, Ordering::Relaxed);
        metrics::record_event_broadcast(event.kind());

        let symbol = event.symbol().to_string();
        let frame = ServerFrame::from(event.clone());

        let mut shed: Vec<Uuid> = Vec::new();

        for client in self.clients.values() {
            if !client.is_interested(&symbol) {
                continue;
            }

            match client.tx.try_send(frame.clone()) {
                Ok(()) => {
                    self.shared.frames_sent.fetch_add(1, Ordering::Relaxed);
                    metrics::record_frame_sent(frame.kind());
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        client_id = %client.id,
                        symbol = %symbol,
                        "Client queue full, shedding slow consumer"
                    );
                    shed.push(client.id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(client_id = %client.id, "Client queue closed");
                    shed.push(client.id);
                }
            }
        }

        if !shed.is_empty() {
            for id in shed {
                if self.clients.remove(&id).is_some() {
                    self.shared.clients_shed.fetch_add(1, Ordering::Relaxed);
                    metrics::record_client_shed();
                }
            }
            self.publish_client_count();
        }
    }

    fn publish_client_count(&self) {
        let count = self.clients.len();
        self.shared.connected_clients.store(count, Ordering::Relaxed);
        metrics::set_connected_clients(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::time::Duration;

    use crate::domain::event::TradeData;

    fn trade_event(symbol: &str) -> NormalizedEvent {
        NormalizedEvent::Trade {
            symbol: symbol.to_string(),
            data: TradeData {
                price: Decimal::new(65_000, 0),
                quantity: Decimal::new(1, 2),
                buyer_is_maker: false,
            },
            timestamp: Utc::now(),
        }
    }

    fn spawn_hub(client_queue_capacity: usize) -> (HubHandle, CancellationToken) {
        let cancel = CancellationToken::new();
        let config = HubConfig {
            command_capacity: 64,
            client_queue_capacity,
        };
        let (hub, handle) = Hub::new(config, cancel.clone());
        tokio::spawn(hub.run());
        (handle, cancel)
    }

    async fn recv_frame(rx: &mut mpsc::Receiver<ServerFrame>) -> ServerFrame {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("queue closed")
    }

    #[tokio::test]
    async fn broadcast_respects_interest_sets() {
        let (handle, _cancel) = spawn_hub(16);

        let (btc_tx, mut btc_rx) = mpsc::channel(16);
        let btc_client = ClientHandle::new(Uuid::new_v4(), btc_tx);
        btc_client.interests.write().insert("BTCUSDT".to_string());

        let (eth_tx, mut eth_rx) = mpsc::channel(16);
        let eth_client = ClientHandle::new(Uuid::new_v4(), eth_tx);
        eth_client.interests.write().insert("ETHUSDT".to_string());

        let (all_tx, mut all_rx) = mpsc::channel(16);
        let all_client = ClientHandle::new(Uuid::new_v4(), all_tx);

        handle.register(btc_client).await.unwrap();
        handle.register(eth_client).await.unwrap();
        handle.register(all_client).await.unwrap();

        handle.broadcast(trade_event("BTCUSDT")).await.unwrap();

        let frame = recv_frame(&mut btc_rx).await;
        assert_eq!(frame.symbol(), Some("BTCUSDT"));

        // Empty interest set receives everything.
        let frame = recv_frame(&mut all_rx).await;
        assert_eq!(frame.symbol(), Some("BTCUSDT"));

        // The ETH subscriber must see nothing. The hub loop processed the
        // broadcast before the frames above arrived, so an empty queue
        // here is conclusive.
        assert!(eth_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn slow_consumer_is_shed() {
        let (handle, _cancel) = spawn_hub(2);

        let (tx, mut rx) = mpsc::channel(2);
        let slow = ClientHandle::new(Uuid::new_v4(), tx);
        handle.register(slow).await.unwrap();

        let (fast_tx, mut fast_rx) = mpsc::channel(16);
        let fast = ClientHandle::new(Uuid::new_v4(), fast_tx);
        handle.register(fast).await.unwrap();

        // Fill the slow queue past capacity without draining it.
        for _ in 0..3 {
            handle.broadcast(trade_event("BTCUSDT")).await.unwrap();
        }

        // The fast client got all three frames.
        for _ in 0..3 {
            let _ = recv_frame(&mut fast_rx).await;
        }

        let stats = handle.stats();
        assert_eq!(stats.clients_shed, 1);
        assert_eq!(stats.connected_clients, 1);

        // The shed client's queue still holds the two frames delivered
        // before the overflow, then closes.
        let _ = recv_frame(&mut rx).await;
        let _ = recv_frame(&mut rx).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn unregister_removes_client() {
        let (handle, _cancel) = spawn_hub(16);

        let (tx, mut rx) = mpsc::channel(16);
        let id = Uuid::new_v4();
        handle.register(ClientHandle::new(id, tx)).await.unwrap();
        handle.unregister(id).await.unwrap();

        handle.broadcast(trade_event("BTCUSDT")).await.unwrap();

        // Queue closes once the registry entry is dropped.
        assert!(rx.recv().await.is_none());
        assert_eq!(handle.client_count(), 0);
    }

    #[tokio::test]
    async fn unregister_unknown_id_is_noop() {
        let (handle, _cancel) = spawn_hub(16);
        handle.unregister(Uuid::new_v4()).await.unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        handle.register(ClientHandle::new(Uuid::new_v4(), tx)).await.unwrap();
        handle.broadcast(trade_event("ETHUSDT")).await.unwrap();

        let frame = recv_frame(&mut rx).await;
        assert_eq!(frame.symbol(), Some("ETHUSDT"));
    }

    #[tokio::test]
    async fn cancel_closes_client_queues() {
        let (handle, cancel) = spawn_hub(16);

        let (tx, mut rx) = mpsc::channel(16);
        handle.register(ClientHandle::new(Uuid::new_v4(), tx)).await.unwrap();
        handle.broadcast(trade_event("BTCUSDT")).await.unwrap();
        let _ = recv_frame(&mut rx).await;

        cancel.cancel();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stats_count_broadcasts_and_frames() {
        let (handle, _cancel) = spawn_hub(16);

        let (tx, mut rx) = mpsc::channel(16);
        handle.register(ClientHandle::new(Uuid::new_v4(), tx)).await.unwrap();

        handle.broadcast(trade_event("BTCUSDT")).await.unwrap();
        handle.broadcast(trade_event("ETHUSDT")).await.unwrap();

        let _ = recv_frame(&mut rx).await;
        let _ = recv_frame(&mut rx).await;

        let stats = handle.stats();
        assert_eq!(stats.events_broadcast, 2);
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.connected_clients, 1);
    }
}
