//! Infrastructure Layer - External system adapters.
//!
//! This layer contains the adapters that connect the hub to the
//! outside world: the venue WebSocket client, the subscriber-facing
//! servers, and the observability stack.

/// Binance WebSocket adapter for upstream market data.
pub mod binance;

/// Configuration loading from environment variables.
pub mod config;

/// Health check and metrics HTTP endpoint.
pub mod health;

/// Prometheus metrics recording.
pub mod metrics;

/// Downstream WebSocket server and client sessions.
pub mod server;

/// Tracing subscriber setup.
pub mod telemetry;
