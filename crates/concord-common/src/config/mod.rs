//! Client configuration
//!
//! Loads configuration from environment variables with sensible defaults.

mod client_config;

pub use client_config::{ApiConfig, ClientConfig, GatewayConfig, ReconnectConfig};

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value: {0}")]
    Invalid(String),
}
