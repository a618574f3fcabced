//! Binance Stream Hub Binary
//!
//! Starts the market data fan-out hub.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin binance-stream-hub
//! ```
//!
//! # Environment Variables
//!
//! All variables are optional; defaults are production values.
//!
//! - `BINANCE_WS_URL`: Venue WebSocket base URL (default: wss://stream.binance.com:9443)
//! - `STREAM_HUB_SYMBOLS`: Comma-separated symbols (default: ten major pairs)
//! - `STREAM_HUB_KLINE_INTERVAL`: Kline interval (default: 1m)
//! - `STREAM_HUB_WS_PORT`: Subscriber WebSocket port (default: 8080)
//! - `STREAM_HUB_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `STREAM_HUB_QUEUE_CAPACITY`: Per-client frame queue capacity (default: 256)
//! - `STREAM_HUB_COMMAND_CAPACITY`: Hub command channel capacity (default: 1024)
//! - `STREAM_HUB_IDLE_PING_SECS`: Downstream idle ping interval (default: 54)
//! - `STREAM_HUB_UPSTREAM_PING_INTERVAL_SECS`: Venue keepalive ping interval (default: 180)
//! - `STREAM_HUB_UPSTREAM_PONG_TIMEOUT_SECS`: Venue pong timeout (default: 60)
//! - `STREAM_HUB_RECONNECT_BASE_DELAY_MS`: Reconnect base delay (default: 2000)
//! - `STREAM_HUB_RECONNECT_MAX_DELAY_SECS`: Reconnect delay cap (default: 60)
//! - `STREAM_HUB_MAX_RECONNECT_ATTEMPTS`: Reconnect budget (default: 10)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use binance_stream_hub::infrastructure::binance::{
    BinanceClient, BinanceClientConfig, KeepaliveConfig, ReconnectConfig, UpstreamEvent,
};
use binance_stream_hub::infrastructure::metrics;
use binance_stream_hub::infrastructure::server::{SessionConfig, WsServer};
use binance_stream_hub::infrastructure::telemetry;
use binance_stream_hub::{
    HealthServer, HealthServerState, Hub, HubConfig, HubHandle, StreamHubConfig, UpstreamState,
    UpstreamStatus, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    telemetry::init();

    tracing::info!("Starting Binance Stream Hub");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = StreamHubConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Initialize the fan-out hub
    let hub_config = HubConfig {
        command_capacity: config.channels.command_capacity,
        client_queue_capacity: config.channels.client_queue_capacity,
    };
    let (hub, hub_handle) = Hub::new(hub_config, shutdown_token.clone());
    tokio::spawn(hub.run());

    // Shared upstream status for the health endpoints
    let upstream_status = Arc::new(UpstreamStatus::new());

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&upstream_status),
        hub_handle.clone(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Initialize subscriber WebSocket server
    let session_config = SessionConfig {
        idle_ping_interval: config.channels.idle_ping_interval,
        queue_capacity: config.channels.client_queue_capacity,
    };
    let ws_server = WsServer::new(
        config.server.ws_port,
        hub_handle.clone(),
        session_config,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = ws_server.run().await {
            tracing::error!(error = %e, "WebSocket server error");
        }
    });

    // Initialize the venue client
    let client_config = BinanceClientConfig {
        url: config.upstream.url.clone(),
        symbols: config.upstream.symbols.clone(),
        kline_interval: config.upstream.kline_interval.clone(),
        reconnect: ReconnectConfig {
            base_delay: config.connection.reconnect_base_delay,
            max_delay: config.connection.reconnect_max_delay,
            max_attempts: config.connection.max_reconnect_attempts,
            ..ReconnectConfig::default()
        },
        keepalive: KeepaliveConfig {
            ping_interval: config.connection.ping_interval,
            pong_timeout: config.connection.pong_timeout,
        },
    };

    let (event_tx, event_rx) = mpsc::channel::<UpstreamEvent>(1024);
    let client = Arc::new(BinanceClient::new(
        client_config,
        event_tx,
        shutdown_token.clone(),
    ));

    // Spawn the upstream event pump
    let pump_hub = hub_handle.clone();
    let pump_status = Arc::clone(&upstream_status);
    tokio::spawn(async move {
        handle_upstream_events(event_rx, pump_hub, pump_status).await;
    });

    // Spawn the venue client
    let client_clone = Arc::clone(&client);
    tokio::spawn(async move {
        if let Err(e) = client_clone.run().await {
            tracing::error!(error = %e, "Binance client error");
        }
    });

    tracing::info!("Stream hub ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Stream hub stopped");
    Ok(())
}

/// Translate venue client events into hub broadcasts and status updates.
async fn handle_upstream_events(
    mut rx: mpsc::Receiver<UpstreamEvent>,
    hub: HubHandle,
    status: Arc<UpstreamStatus>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            UpstreamEvent::Connected => {
                status.set_state(UpstreamState::Connected);
                metrics::set_upstream_state(UpstreamState::Connected);
                tracing::info!("Venue connection established");
            }
            UpstreamEvent::Disconnected => {
                status.set_state(UpstreamState::Disconnected);
                metrics::set_upstream_state(UpstreamState::Disconnected);
                tracing::warn!("Venue connection lost");
            }
            UpstreamEvent::Reconnecting { attempt } => {
                status.set_state(UpstreamState::Reconnecting);
                status.set_reconnect_attempts(attempt);
                metrics::set_upstream_state(UpstreamState::Reconnecting);
                metrics::record_reconnect();
                tracing::info!(attempt, "Venue reconnecting");
            }
            UpstreamEvent::Unavailable => {
                status.set_state(UpstreamState::Unavailable);
                status.set_error("reconnect attempt budget exhausted".to_string());
                metrics::set_upstream_state(UpstreamState::Unavailable);
                tracing::error!("Venue connection abandoned, not retrying");
            }
            UpstreamEvent::Event(event) => {
                status.increment_events();
                metrics::record_event_received(event.kind());
                if hub.broadcast(event).await.is_err() {
                    tracing::warn!("Hub is gone, stopping upstream event pump");
                    return;
                }
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &StreamHubConfig) {
    tracing::info!(
        url = %config.upstream.url,
        symbols = config.upstream.symbols.len(),
        kline_interval = %config.upstream.kline_interval,
        ws_port = config.server.ws_port,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        symbols = ?config.upstream.symbols,
        queue_capacity = config.channels.client_queue_capacity,
        max_reconnect_attempts = config.connection.max_reconnect_attempts,
        "Stream settings"
    );
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
