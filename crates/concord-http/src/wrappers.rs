//! Gateway endpoint wrappers
//!
//! Thin request builders for the gateway connection-info endpoints; everything
//! else about the request lifecycle lives in [`crate::client`].

use crate::client::HttpClient;
use crate::error::HttpError;
use crate::route::Route;
use serde::Deserialize;
use std::time::Duration;

/// Response of `GET /gateway`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayInfo {
    /// Websocket URL to connect to.
    pub url: String,
}

/// Response of `GET /gateway/bot`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayBotInfo {
    /// Websocket URL to connect to.
    pub url: String,

    /// Recommended shard count.
    pub shards: u16,

    /// Identify budget for this credential.
    pub session_start_limit: SessionStartLimit,
}

/// The server's identify budget.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionStartLimit {
    /// Total identifies allowed per window.
    pub total: u32,

    /// Identifies left in the current window.
    pub remaining: u32,

    /// Milliseconds until the window resets.
    pub reset_after: u64,

    /// How many shards may identify concurrently (per 5s window).
    pub max_concurrency: u16,
}

impl SessionStartLimit {
    #[must_use]
    pub fn reset_after(&self) -> Duration {
        Duration::from_millis(self.reset_after)
    }
}

impl HttpClient {
    /// Fetch gateway connection info.
    ///
    /// Unauthenticated and exempt from the global gate.
    pub async fn get_gateway(&self) -> Result<GatewayInfo, HttpError> {
        let route = Route::get("/gateway").ignore_global();
        let response = self.request(&route, |b| b).await?;
        Ok(response.json().await?)
    }

    /// Fetch gateway connection info for this bot, including the recommended
    /// shard count and identify concurrency ceiling.
    pub async fn get_gateway_bot(&self) -> Result<GatewayBotInfo, HttpError> {
        let route = Route::get("/gateway/bot");
        let response = self.request(&route, |b| b).await?;
        Ok(response.json().await?)
    }
}
