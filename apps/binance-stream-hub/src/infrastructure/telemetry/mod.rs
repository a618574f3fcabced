//! Tracing Subscriber Setup
//!
//! Configures structured logging for the hub.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard env-filter directives, layered on top of the
//!   built-in defaults
//!
//! # Usage
//!
//! ```ignore
//! use binance_stream_hub::infrastructure::telemetry;
//!
//! // Initialize once at startup
//! telemetry::init();
//!
//! tracing::info!("Hub starting");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber.
///
/// Defaults the hub's own crate to `info` and quiets the HTTP stack,
/// with `RUST_LOG` directives layered on top.
#[allow(clippy::expect_used)]
pub fn init() {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(
            "binance_stream_hub=info"
                .parse()
                .expect("static directive 'binance_stream_hub=info' is valid"),
        )
        .add_directive(
            "tower_http=info"
                .parse()
                .expect("static directive 'tower_http=info' is valid"),
        )
        .add_directive(
            "tungstenite=warn"
                .parse()
                .expect("static directive 'tungstenite=warn' is valid"),
        )
        .add_directive(
            "hyper=warn"
                .parse()
                .expect("static directive 'hyper=warn' is valid"),
        );

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
