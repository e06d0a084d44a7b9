//! Individual gateway connection
//!
//! One shard owns one websocket transport and drives the
//! identify/resume/heartbeat protocol over it, reconnecting according to the
//! server's close-code classification until it either shuts down or hits a
//! non-retryable condition.

use super::{IdentifyThrottle, ReconnectPolicy, Session};
use crate::decompressor::Decompressor;
use crate::error::GatewayError;
use crate::events::{ShardEvent, ShardEventKind};
use crate::protocol::{
    classify_close, CloseAction, GatewayMessage, IdentifyPayload, IdentifyProperties, Intents,
    OpCode, PresenceUpdatePayload, ReadyPayload, ResumePayload,
};
use crate::transport::{GatewayConnector, Transport, TransportEvent};
use concord_common::Token;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Not connected; initial and terminal.
    Disconnected,
    /// Transport established, awaiting the server hello.
    Connecting,
    /// Waiting on the identify throttle / sending a fresh identify.
    Identifying,
    /// Sending a resume for an existing session.
    Resuming,
    /// Steady state: dispatching events and heartbeating.
    Ready,
    /// Transport lost or reconnect requested; deciding resume vs identify.
    Reconnecting,
}

/// Owner-side handle to a running shard.
///
/// Dropping the handle (outside of [`join`](ShardHandle::join)) stops the
/// shard, since nothing could control it afterwards.
#[derive(Debug)]
pub struct ShardHandle {
    pub(crate) shard_id: u16,
    pub(crate) state: watch::Receiver<ShardState>,
    pub(crate) commands: mpsc::UnboundedSender<ShardCommand>,
    pub(crate) cancel: CancellationToken,
    pub(crate) task: JoinHandle<()>,
}

impl ShardHandle {
    #[must_use]
    pub fn shard_id(&self) -> u16 {
        self.shard_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ShardState {
        *self.state.borrow()
    }

    /// Ask the shard to stop. Cancels any pending wait it holds.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Send a presence update over the live connection.
    ///
    /// Queued while the shard is between connections and flushed once it is
    /// connected again.
    pub fn update_presence(&self, presence: PresenceUpdatePayload) -> Result<(), GatewayError> {
        if !presence.is_valid_status() {
            return Err(GatewayError::Protocol(format!(
                "invalid presence status: {}",
                presence.status
            )));
        }
        self.commands
            .send(ShardCommand::UpdatePresence(presence))
            .map_err(|_| GatewayError::Protocol("shard has stopped".to_string()))
    }

    /// Wait until the shard has left its initial `Disconnected` state,
    /// i.e. its transport attempt has begun.
    pub async fn wait_started(&self) {
        let mut rx = self.state.clone();
        loop {
            if *rx.borrow_and_update() != ShardState::Disconnected {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Wait for the shard task to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Static configuration for one shard.
#[derive(Debug, Clone)]
pub(crate) struct ShardConfig {
    pub shard_id: u16,
    pub shard_count: u16,
    pub token: Token,
    pub intents: Intents,
    pub presence: Option<PresenceUpdatePayload>,
}

/// An instruction from the shard's owner, applied on the live connection.
#[derive(Debug)]
pub(crate) enum ShardCommand {
    UpdatePresence(PresenceUpdatePayload),
}

/// How one transport session ended.
enum SessionEnd {
    /// Reconnect. When not resumable the session is cleared first.
    Retry { resumable: bool },
    /// Stop permanently with a classified error.
    Fatal(GatewayError),
    /// Stop because the owner asked.
    Shutdown,
}

/// What woke the connection loop.
enum LoopAction {
    Heartbeat,
    IdentifySlot,
    Transport(Option<TransportEvent>),
    Command(Option<ShardCommand>),
    Cancelled,
}

/// The task driving one shard.
pub(crate) struct ShardRunner {
    config: ShardConfig,
    connector: Arc<dyn GatewayConnector>,
    throttle: Arc<IdentifyThrottle>,
    events: mpsc::Sender<ShardEvent>,
    state: watch::Sender<ShardState>,
    commands: mpsc::UnboundedReceiver<ShardCommand>,
    cancel: CancellationToken,
    session: Session,
    policy: ReconnectPolicy,
}

impl ShardRunner {
    pub(crate) fn new(
        config: ShardConfig,
        connector: Arc<dyn GatewayConnector>,
        throttle: Arc<IdentifyThrottle>,
        events: mpsc::Sender<ShardEvent>,
        policy: ReconnectPolicy,
        cancel: CancellationToken,
    ) -> (
        Self,
        watch::Receiver<ShardState>,
        mpsc::UnboundedSender<ShardCommand>,
    ) {
        let (state, state_rx) = watch::channel(ShardState::Disconnected);
        let (commands_tx, commands) = mpsc::unbounded_channel();
        (
            Self {
                config,
                connector,
                throttle,
                events,
                state,
                commands,
                cancel,
                session: Session::default(),
                policy,
            },
            state_rx,
            commands_tx,
        )
    }

    /// Drive the shard until shutdown or a non-retryable condition.
    ///
    /// Exactly one `Disconnected` event is emitted, at the very end.
    pub(crate) async fn run(mut self) {
        let reason = loop {
            match self.run_connection().await {
                SessionEnd::Shutdown => break None,
                SessionEnd::Fatal(err) => {
                    tracing::error!(
                        shard_id = self.config.shard_id,
                        error = %err,
                        "shard hit a non-retryable condition"
                    );
                    break Some(err);
                }
                SessionEnd::Retry { resumable } => {
                    if !resumable {
                        self.session.clear();
                    }
                    self.set_state(ShardState::Reconnecting);

                    match self.policy.check() {
                        Ok(delay) => {
                            tracing::info!(
                                shard_id = self.config.shard_id,
                                ?delay,
                                resumable,
                                "reconnecting to the gateway"
                            );
                            tokio::select! {
                                () = self.cancel.cancelled() => break None,
                                () = tokio::time::sleep(delay) => {}
                            }
                        }
                        Err(err) => break Some(err),
                    }
                }
            }
        };

        self.set_state(ShardState::Disconnected);
        self.emit(ShardEventKind::Disconnected { reason }).await;
    }

    /// One transport session, from dial to disconnect.
    async fn run_connection(&mut self) -> SessionEnd {
        let mut transport = match self.connector.connect().await {
            Ok(transport) => transport,
            Err(err) => {
                tracing::warn!(
                    shard_id = self.config.shard_id,
                    error = %err,
                    "failed to establish gateway transport"
                );
                return SessionEnd::Retry { resumable: true };
            }
        };
        self.set_state(ShardState::Connecting);

        // Fresh compression context per transport, never per message.
        let mut decompressor = Decompressor::new();

        let hello = match self.await_hello(&mut transport, &mut decompressor).await {
            Ok(hello) => hello,
            Err(end) => {
                transport.close().await;
                return end;
            }
        };
        let heartbeat_interval = Duration::from_millis(hello.heartbeat_interval);
        self.emit(ShardEventKind::Connected).await;

        // Heartbeats run on their own timer from hello onward, independent
        // of traffic and of any identify queueing.
        let mut ticker =
            tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
        let mut heartbeat_acked = true;

        let mut awaiting_identify = false;
        if self.session.can_resume() {
            self.set_state(ShardState::Resuming);
            let payload = ResumePayload {
                token: self.config.token.expose().to_string(),
                session_id: self.session.id.clone().unwrap_or_default(),
                seq: self.session.sequence.unwrap_or_default(),
            };
            tracing::info!(shard_id = self.config.shard_id, "resuming session");
            if let Some(end) = self
                .send(&mut transport, &GatewayMessage::resume(&payload))
                .await
            {
                transport.close().await;
                return end;
            }
        } else {
            self.set_state(ShardState::Identifying);
            awaiting_identify = true;
        }

        // Resumes bypass the identify throttle. A fresh identify waits for
        // its concurrency bucket slot as a select branch, so a queued shard
        // keeps heartbeating and reading inbound frames while it waits.
        let throttle = Arc::clone(&self.throttle);
        let mut identify_slot = pin!(throttle.acquire());

        loop {
            let action = tokio::select! {
                () = self.cancel.cancelled() => LoopAction::Cancelled,
                () = &mut identify_slot, if awaiting_identify => LoopAction::IdentifySlot,
                _ = ticker.tick() => LoopAction::Heartbeat,
                cmd = self.commands.recv() => LoopAction::Command(cmd),
                ev = transport.recv() => LoopAction::Transport(ev),
            };

            match action {
                LoopAction::Cancelled => {
                    transport.close().await;
                    return SessionEnd::Shutdown;
                }
                // The owning handle is gone; nothing could stop us later.
                LoopAction::Command(None) => {
                    transport.close().await;
                    return SessionEnd::Shutdown;
                }
                LoopAction::IdentifySlot => {
                    awaiting_identify = false;
                    let payload = IdentifyPayload {
                        token: self.config.token.expose().to_string(),
                        intents: self.config.intents,
                        shard: [self.config.shard_id, self.config.shard_count],
                        properties: Some(IdentifyProperties::this_library()),
                        presence: self.config.presence.clone(),
                    };
                    tracing::info!(shard_id = self.config.shard_id, "identifying");
                    if let Some(end) = self
                        .send(&mut transport, &GatewayMessage::identify(&payload))
                        .await
                    {
                        return end;
                    }
                }
                LoopAction::Command(Some(ShardCommand::UpdatePresence(presence))) => {
                    let message = GatewayMessage::presence_update(&presence);
                    if let Some(end) = self.send(&mut transport, &message).await {
                        return end;
                    }
                }
                LoopAction::Heartbeat => {
                    if !heartbeat_acked {
                        tracing::warn!(
                            shard_id = self.config.shard_id,
                            "heartbeat went unacknowledged, assuming zombied connection"
                        );
                        transport.close().await;
                        return SessionEnd::Retry { resumable: true };
                    }
                    let beat = GatewayMessage::heartbeat(self.session.sequence);
                    if let Some(end) = self.send(&mut transport, &beat).await {
                        return end;
                    }
                    heartbeat_acked = false;
                }
                LoopAction::Transport(None) => {
                    tracing::info!(
                        shard_id = self.config.shard_id,
                        "transport dropped without a close frame"
                    );
                    return SessionEnd::Retry { resumable: true };
                }
                LoopAction::Transport(Some(TransportEvent::Closed { code, reason })) => {
                    return self.handle_close(code, reason.as_deref());
                }
                LoopAction::Transport(Some(event)) => {
                    let messages = match decode_frames(&mut decompressor, &event) {
                        Ok(messages) => messages,
                        Err(err) => {
                            tracing::warn!(
                                shard_id = self.config.shard_id,
                                error = %err,
                                "failed to decode gateway frame"
                            );
                            transport.close().await;
                            return SessionEnd::Retry { resumable: true };
                        }
                    };
                    for message in messages {
                        if let Some(end) = self
                            .handle_message(&mut transport, &mut heartbeat_acked, message)
                            .await
                        {
                            transport.close().await;
                            return end;
                        }
                    }
                }
            }
        }
    }

    /// Read until the server's hello arrives.
    async fn await_hello(
        &mut self,
        transport: &mut Box<dyn Transport>,
        decompressor: &mut Decompressor,
    ) -> Result<crate::protocol::HelloPayload, SessionEnd> {
        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => return Err(SessionEnd::Shutdown),
                ev = transport.recv() => ev,
            };

            let event = match event {
                Some(event) => event,
                None => return Err(SessionEnd::Retry { resumable: true }),
            };
            if let TransportEvent::Closed { code, reason } = event {
                return Err(self.handle_close(code, reason.as_deref()));
            }

            let messages = decode_frames(decompressor, &event)
                .map_err(|_| SessionEnd::Retry { resumable: true })?;
            for message in messages {
                if let Some(hello) = message.as_hello() {
                    tracing::debug!(
                        shard_id = self.config.shard_id,
                        heartbeat_interval = hello.heartbeat_interval,
                        "received gateway hello"
                    );
                    return Ok(hello);
                }
                tracing::debug!(
                    shard_id = self.config.shard_id,
                    op = %message.op,
                    "ignoring pre-hello payload"
                );
            }
        }
    }

    /// Handle one decoded server message. Returns how to end the session,
    /// if it must end.
    async fn handle_message(
        &mut self,
        transport: &mut Box<dyn Transport>,
        heartbeat_acked: &mut bool,
        message: GatewayMessage,
    ) -> Option<SessionEnd> {
        match message.op {
            OpCode::Dispatch => {
                if let Some(seq) = message.s {
                    self.session.observe_sequence(seq);
                }
                self.handle_dispatch(message).await;
                None
            }
            OpCode::HeartbeatAck => {
                *heartbeat_acked = true;
                None
            }
            OpCode::Heartbeat => {
                // The server may request an immediate heartbeat.
                let beat = GatewayMessage::heartbeat(self.session.sequence);
                self.send(transport, &beat).await
            }
            OpCode::Reconnect => {
                tracing::info!(
                    shard_id = self.config.shard_id,
                    "server requested a reconnect"
                );
                Some(SessionEnd::Retry { resumable: true })
            }
            OpCode::InvalidSession => {
                let resumable = message.as_invalid_session().unwrap_or(false);
                tracing::info!(
                    shard_id = self.config.shard_id,
                    resumable,
                    "server invalidated the session"
                );
                Some(SessionEnd::Retry { resumable })
            }
            OpCode::Hello => {
                tracing::debug!(
                    shard_id = self.config.shard_id,
                    "ignoring duplicate hello"
                );
                None
            }
            OpCode::Identify | OpCode::PresenceUpdate | OpCode::Resume => {
                tracing::warn!(
                    shard_id = self.config.shard_id,
                    op = %message.op,
                    "server sent a client-only op code"
                );
                None
            }
        }
    }

    /// Forward a dispatch and react to the session-level ones.
    async fn handle_dispatch(&mut self, message: GatewayMessage) {
        let event = message.t.clone().unwrap_or_default();
        match event.as_str() {
            "READY" => {
                let session_id = message
                    .d
                    .as_ref()
                    .and_then(|d| serde_json::from_value::<ReadyPayload>(d.clone()).ok())
                    .map(|ready| ready.session_id);
                match session_id {
                    Some(session_id) => {
                        tracing::info!(
                            shard_id = self.config.shard_id,
                            session_id = %session_id,
                            "shard is ready"
                        );
                        self.session.id = Some(session_id.clone());
                        self.set_state(ShardState::Ready);
                        self.policy.reset();
                        self.emit(ShardEventKind::Identified { session_id }).await;
                    }
                    None => {
                        tracing::warn!(
                            shard_id = self.config.shard_id,
                            "READY carried no session id; resume will be unavailable"
                        );
                        self.set_state(ShardState::Ready);
                        self.policy.reset();
                    }
                }
            }
            "RESUMED" => {
                tracing::info!(shard_id = self.config.shard_id, "session resumed");
                self.set_state(ShardState::Ready);
                self.policy.reset();
                self.emit(ShardEventKind::Resumed).await;
            }
            _ => {}
        }

        self.emit(ShardEventKind::Dispatch {
            event,
            sequence: message.s.unwrap_or_default(),
            data: message.d.unwrap_or(serde_json::Value::Null),
        })
        .await;
    }

    /// Classify a close frame into the next lifecycle step.
    fn handle_close(&mut self, code: Option<u16>, reason: Option<&str>) -> SessionEnd {
        tracing::info!(
            shard_id = self.config.shard_id,
            code = ?code,
            reason = ?reason,
            "gateway connection closed"
        );
        match classify_close(code) {
            CloseAction::Resume => SessionEnd::Retry { resumable: true },
            CloseAction::Reidentify => SessionEnd::Retry { resumable: false },
            CloseAction::Fatal(err) => SessionEnd::Fatal(err),
        }
    }

    async fn send(
        &mut self,
        transport: &mut Box<dyn Transport>,
        message: &GatewayMessage,
    ) -> Option<SessionEnd> {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(
                    shard_id = self.config.shard_id,
                    error = %err,
                    "failed to serialize outbound payload"
                );
                return None;
            }
        };
        if let Err(err) = transport.send(json).await {
            tracing::warn!(
                shard_id = self.config.shard_id,
                error = %err,
                "failed to send payload, transport presumed dead"
            );
            return Some(SessionEnd::Retry { resumable: true });
        }
        None
    }

    fn set_state(&self, state: ShardState) {
        if *self.state.borrow() != state {
            tracing::debug!(shard_id = self.config.shard_id, ?state, "shard state change");
            self.state.send_replace(state);
        }
    }

    async fn emit(&self, kind: ShardEventKind) {
        if self
            .events
            .send(ShardEvent::new(self.config.shard_id, kind))
            .await
            .is_err()
        {
            tracing::trace!(
                shard_id = self.config.shard_id,
                "event consumer dropped, discarding event"
            );
        }
    }
}

/// Turn one transport event into decoded gateway messages.
fn decode_frames(
    decompressor: &mut Decompressor,
    event: &TransportEvent,
) -> Result<Vec<GatewayMessage>, GatewayError> {
    match event {
        TransportEvent::Binary(chunk) => {
            let mut messages = Vec::new();
            for payload in decompressor.feed(chunk)? {
                match GatewayMessage::from_bytes(&payload) {
                    Ok(message) => messages.push(message),
                    Err(err) => {
                        // A single undecodable payload is dropped rather than
                        // tearing down the connection.
                        tracing::warn!(error = %err, "dropping undecodable payload");
                    }
                }
            }
            Ok(messages)
        }
        TransportEvent::Text(text) => match GatewayMessage::from_json(text) {
            Ok(message) => Ok(vec![message]),
            Err(err) => {
                tracing::warn!(error = %err, "dropping undecodable payload");
                Ok(Vec::new())
            }
        },
        TransportEvent::Closed { .. } => Ok(Vec::new()),
    }
}
