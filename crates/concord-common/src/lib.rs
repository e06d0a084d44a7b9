//! # concord-common
//!
//! Shared utilities for the Concord client: configuration, credentials, and telemetry.

pub mod auth;
pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::Token;
pub use config::{ApiConfig, ClientConfig, ConfigError, GatewayConfig, ReconnectConfig};
pub use telemetry::{init_tracing, try_init_tracing, TracingConfig, TracingError};
