//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Events**: Counts of market events received and fanned out by kind
//! - **Clients**: Downstream connection count and shed count
//! - **Upstream**: Venue connection state and reconnect attempts
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::event::UpstreamState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Event counters
    describe_counter!(
        "stream_hub_events_received_total",
        "Total market events received from the venue"
    );
    describe_counter!(
        "stream_hub_events_broadcast_total",
        "Total market events fanned out by the hub"
    );
    describe_counter!(
        "stream_hub_frames_sent_total",
        "Total frames delivered to client queues"
    );

    // Client gauges and counters
    describe_gauge!(
        "stream_hub_connected_clients",
        "Number of registered downstream clients"
    );
    describe_counter!(
        "stream_hub_clients_shed_total",
        "Total clients disconnected for falling behind"
    );
    describe_counter!(
        "stream_hub_client_commands_total",
        "Total commands received from downstream clients"
    );

    // Upstream connection state
    describe_gauge!(
        "stream_hub_upstream_connected",
        "Whether the venue connection is live (1) or not (0)"
    );
    describe_counter!(
        "stream_hub_reconnects_total",
        "Total venue reconnection attempts"
    );
    describe_counter!(
        "stream_hub_decode_errors_total",
        "Total venue frames that failed to decode"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a market event received from the venue.
pub fn record_event_received(kind: &'static str) {
    counter!(
        "stream_hub_events_received_total",
        "kind" => kind
    )
    .increment(1);
}

/// Record a market event fanned out by the hub.
pub fn record_event_broadcast(kind: &'static str) {
    counter!(
        "stream_hub_events_broadcast_total",
        "kind" => kind
    )
    .increment(1);
}

/// Record a frame delivered to a client queue.
pub fn record_frame_sent(kind: &'static str) {
    counter!(
        "stream_hub_frames_sent_total",
        "kind" => kind
    )
    .increment(1);
}

/// Update the downstream client count.
pub fn set_connected_clients(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("stream_hub_connected_clients").set(count as f64);
}

/// Record a client shed for falling behind.
pub fn record_client_shed() {
    counter!("stream_hub_clients_shed_total").increment(1);
}

/// Record a command received from a downstream client.
pub fn record_client_command(kind: &'static str) {
    counter!(
        "stream_hub_client_commands_total",
        "kind" => kind
    )
    .increment(1);
}

/// Update the upstream connection gauge from the connection state.
pub fn set_upstream_state(state: UpstreamState) {
    let value = if state.is_connected() { 1.0 } else { 0.0 };
    gauge!("stream_hub_upstream_connected").set(value);
}

/// Record a venue reconnection attempt.
pub fn record_reconnect() {
    counter!("stream_hub_reconnects_total").increment(1);
}

/// Record a venue frame that failed to decode.
pub fn record_decode_error() {
    counter!("stream_hub_decode_errors_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        // No recorder installed in unit tests; these must not panic.
        record_event_received("ticker");
        record_event_broadcast("trade");
        record_frame_sent("kline");
        record_client_shed();
        record_client_command("subscribe");
        record_reconnect();
        record_decode_error();
        set_connected_clients(3);
        set_upstream_state(UpstreamState::Connected);
    }
}
