//! Configuration Module
//!
//! Configuration loading for the stream hub service.

mod settings;

pub use settings::{
    ChannelSettings, ConfigError, ConnectionSettings, ServerSettings, StreamHubConfig,
    UpstreamSettings,
};
