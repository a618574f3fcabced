#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Binance Stream Hub - Market Data Fan-Out
//!
//! A WebSocket hub that maintains a single connection to Binance's
//! combined market data stream and fans ticker, kline, and trade
//! events out to many downstream subscribers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core market data types with no I/O
//!   - `event`: Normalized market events (ticker, kline, trade)
//!   - `protocol`: The downstream subscriber protocol
//!
//! - **Application**: Fan-out orchestration
//!   - `hub`: Client registry and event routing
//!   - `status`: Shared upstream connection status
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `binance`: WebSocket client for the venue's combined stream
//!   - `server`: Subscriber-facing WebSocket server and sessions
//!   - `config`: Configuration loading
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`: Prometheus metrics
//!   - `telemetry`: Tracing subscriber setup
//!
//! # Data Flow
//!
//! ```text
//!                       ┌─────────────┐     ┌─────────────┐──► Client 1
//! Binance combined WS ─►│     Hub     │────►│  WebSocket  │──► Client 2
//!                       │  (fan-out)  │     │   Server    │──► Client N
//!                       └─────────────┘     └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no I/O.
pub mod domain;

/// Application layer - Fan-out orchestration and shared state.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::event::{KlineData, NormalizedEvent, TickerData, TradeData, UpstreamState};
pub use domain::protocol::{ClientCommand, ServerFrame, canonical_symbol};

// Fan-out hub
pub use application::hub::{ClientHandle, Hub, HubConfig, HubHandle, HubStats};
pub use application::status::UpstreamStatus;

// Infrastructure config
pub use infrastructure::config::{
    ChannelSettings, ConfigError, ConnectionSettings, ServerSettings, StreamHubConfig,
    UpstreamSettings,
};

// Binance client (for integration tests)
pub use infrastructure::binance::{
    BinanceClient, BinanceClientConfig, BinanceClientError, SymbolCommand, UpstreamEvent,
    UpstreamHandle,
};

// Servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::server::{ClientSession, SessionConfig, WsServer, WsServerError};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
