//! Downstream WebSocket Server
//!
//! HTTP server exposing the subscriber endpoint. Each upgrade on `/ws`
//! becomes a [`ClientSession`] that registers with the hub and runs
//! until the client disconnects or the process shuts down.

pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::hub::HubHandle;

pub use session::{ClientSession, SessionConfig};

// =============================================================================
// Server State
// =============================================================================

/// Shared state handed to the upgrade handler.
pub struct WsServerState {
    hub: HubHandle,
    session_config: SessionConfig,
    cancel: CancellationToken,
}

// =============================================================================
// WebSocket Server
// =============================================================================

/// Subscriber-facing WebSocket server.
pub struct WsServer {
    port: u16,
    state: Arc<WsServerState>,
}

impl WsServer {
    /// Create a new server for the given hub.
    #[must_use]
    pub fn new(
        port: u16,
        hub: HubHandle,
        session_config: SessionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            port,
            state: Arc::new(WsServerState {
                hub,
                session_config,
                cancel,
            }),
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `WsServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), WsServerError> {
        let cancel = self.state.cancel.clone();
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WsServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "WebSocket server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|e| WsServerError::ServerFailed(e.to_string()))?;

        tracing::info!("WebSocket server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| accept_session(socket, state))
}

async fn accept_session(socket: WebSocket, state: Arc<WsServerState>) {
    let session = ClientSession::new(
        state.hub.clone(),
        state.session_config,
        state.cancel.clone(),
    );
    session.run(socket).await;
}

// =============================================================================
// Errors
// =============================================================================

/// WebSocket server errors.
#[derive(Debug, thiserror::Error)]
pub enum WsServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
