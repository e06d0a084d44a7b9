//! Shard orchestration
//!
//! Owns the full set of shards for one credential, assigns each to its
//! identify concurrency bucket, and fans every shard's events into a single
//! consumer channel.

use super::shard::{ShardConfig, ShardHandle, ShardRunner};
use super::{IdentifyThrottle, ReconnectPolicy};
use crate::error::GatewayError;
use crate::events::ShardEvent;
use crate::protocol::{Intents, PresenceUpdatePayload};
use crate::transport::GatewayConnector;
use concord_common::{ReconnectConfig, Token};
use concord_http::client::HttpClient;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Buffered events per manager before shards start applying backpressure.
const EVENT_BUFFER: usize = 256;

/// Settings for a shard group.
///
/// `shard_count` and `max_concurrency` may be left unset and filled in from
/// the server via [`ShardManagerConfig::discover`].
#[derive(Debug, Clone)]
pub struct ShardManagerConfig {
    /// Total shards the event stream is split across.
    pub shard_count: Option<u16>,

    /// Identify concurrency ceiling. Shards with the same
    /// `shard_id % max_concurrency` share one identify window.
    pub max_concurrency: Option<u16>,

    /// Event categories to subscribe to.
    pub intents: Intents,

    /// Presence sent with every identify.
    pub presence: Option<PresenceUpdatePayload>,

    /// Per-shard reconnect budget.
    pub reconnect: ReconnectConfig,
}

impl Default for ShardManagerConfig {
    fn default() -> Self {
        Self {
            shard_count: None,
            max_concurrency: None,
            intents: Intents::unprivileged(),
            presence: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ShardManagerConfig {
    /// Fill unset fields from `GET /gateway/bot` and return the websocket URL
    /// the server wants this credential to use.
    ///
    /// Explicitly configured values win over the server's recommendation.
    pub async fn discover(&mut self, http: &HttpClient) -> Result<String, GatewayError> {
        let info = http.get_gateway_bot().await?;

        if self.shard_count.is_none() {
            self.shard_count = Some(info.shards.max(1));
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = Some(info.session_start_limit.max_concurrency.max(1));
        }

        let needed = u32::from(self.shard_count.unwrap_or(1));
        if info.session_start_limit.remaining < needed {
            tracing::warn!(
                remaining = info.session_start_limit.remaining,
                needed,
                reset_after = ?info.session_start_limit.reset_after(),
                "identify budget is lower than the shard count"
            );
        }

        Ok(info.url)
    }
}

/// Owns and supervises a group of shards.
pub struct ShardManager {
    token: Token,
    config: ShardManagerConfig,
    connector: Arc<dyn GatewayConnector>,
    events: mpsc::Sender<ShardEvent>,
    shards: Vec<ShardHandle>,
    cancel: CancellationToken,
}

impl ShardManager {
    /// Build a manager and the channel its shards will publish events to.
    ///
    /// Nothing connects until [`ShardManager::start`].
    pub fn new(
        token: Token,
        config: ShardManagerConfig,
        connector: Arc<dyn GatewayConnector>,
    ) -> (Self, mpsc::Receiver<ShardEvent>) {
        let (events, events_rx) = mpsc::channel(EVENT_BUFFER);
        (
            Self {
                token,
                config,
                connector,
                events,
                shards: Vec::new(),
                cancel: CancellationToken::new(),
            },
            events_rx,
        )
    }

    /// Spawn every shard, in ascending shard id order.
    ///
    /// A shard's transport attempt begins before the next shard is spawned.
    /// Each shard is given the identify throttle for its concurrency bucket;
    /// waiting for a free identify slot happens inside the shard, so startup
    /// returns once all shards are dialing, not after all are ready.
    pub async fn start(&mut self) -> Result<(), GatewayError> {
        if !self.shards.is_empty() {
            return Err(GatewayError::Protocol(
                "shard manager already started".to_string(),
            ));
        }

        let shard_count = self.config.shard_count.unwrap_or(1).max(1);
        let max_concurrency = self.config.max_concurrency.unwrap_or(1).max(1);

        let throttles: Vec<Arc<IdentifyThrottle>> = (0..max_concurrency)
            .map(|_| Arc::new(IdentifyThrottle::new()))
            .collect();

        tracing::info!(shard_count, max_concurrency, "starting shard group");

        for shard_id in 0..shard_count {
            let config = ShardConfig {
                shard_id,
                shard_count,
                token: self.token.clone(),
                intents: self.config.intents,
                presence: self.config.presence.clone(),
            };
            let throttle = Arc::clone(&throttles[usize::from(shard_id % max_concurrency)]);
            let policy = ReconnectPolicy::new(self.config.reconnect.clone());
            let cancel = self.cancel.child_token();

            let (runner, state, commands) = ShardRunner::new(
                config,
                Arc::clone(&self.connector),
                throttle,
                self.events.clone(),
                policy,
                cancel.clone(),
            );
            let task = tokio::spawn(runner.run());

            let handle = ShardHandle {
                shard_id,
                state,
                commands,
                cancel,
                task,
            };
            handle.wait_started().await;
            self.shards.push(handle);
        }

        Ok(())
    }

    /// Handles to the running shards, in shard id order.
    #[must_use]
    pub fn shards(&self) -> &[ShardHandle] {
        &self.shards
    }

    /// Stop every shard and wait for their tasks to finish.
    pub async fn shutdown(self) {
        tracing::info!(shard_count = self.shards.len(), "shutting down shard group");
        self.cancel.cancel();
        for shard in self.shards {
            shard.join().await;
        }
    }
}

impl std::fmt::Debug for ShardManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardManager")
            .field("config", &self.config)
            .field("shards", &self.shards.len())
            .finish()
    }
}
