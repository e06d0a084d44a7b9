//! Test doubles for the gateway transport
//!
//! [`TestConnector`] stands in for the websocket dialer: every `connect`
//! call produces a paired in-memory duplex, with the server's end handed to
//! the test as a [`ServerLink`].

use async_trait::async_trait;
use concord_gateway::transport::{GatewayConnector, Transport, TransportError, TransportEvent};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connector that parks every dial on an accept queue.
pub struct TestConnector {
    accepts: mpsc::UnboundedSender<ServerLink>,
}

impl TestConnector {
    /// The connector plus its accept queue: one [`ServerLink`] per `connect`
    /// call, in dial order.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerLink>) {
        let (accepts, accepts_rx) = mpsc::unbounded_channel();
        (Arc::new(Self { accepts }), accepts_rx)
    }
}

#[async_trait]
impl GatewayConnector for TestConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();

        self.accepts
            .send(ServerLink {
                to_client,
                from_client,
            })
            .map_err(|_| TransportError::Closed)?;

        Ok(Box::new(TestTransport {
            incoming,
            outgoing: Some(outgoing),
        }))
    }
}

/// The server's end of one accepted connection.
pub struct ServerLink {
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerLink {
    /// Deliver one payload to the client as a text frame.
    pub fn send(&self, payload: &Value) {
        let _ = self
            .to_client
            .send(TransportEvent::Text(payload.to_string()));
    }

    /// Deliver a close frame with the given code.
    pub fn close(&self, code: Option<u16>) {
        let _ = self.to_client.send(TransportEvent::Closed {
            code,
            reason: None,
        });
    }

    /// Next payload the client sent, or `None` once the client hung up.
    pub async fn recv(&mut self) -> Option<Value> {
        let raw = self.from_client.recv().await?;
        serde_json::from_str(&raw).ok()
    }

    /// Skip payloads until one with the given op code arrives.
    ///
    /// # Panics
    ///
    /// Panics if the client hangs up first.
    pub async fn expect_op(&mut self, op: u8) -> Value {
        loop {
            let payload = self
                .recv()
                .await
                .unwrap_or_else(|| panic!("client hung up while waiting for op {op}"));
            if payload["op"] == op {
                return payload;
            }
        }
    }
}

/// The client's end, handed to the shard under test.
struct TestTransport {
    incoming: mpsc::UnboundedReceiver<TransportEvent>,
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl Transport for TestTransport {
    async fn send(&mut self, payload: String) -> Result<(), TransportError> {
        match &self.outgoing {
            Some(tx) => tx.send(payload).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        if self.outgoing.is_none() {
            return None;
        }
        self.incoming.recv().await
    }

    async fn close(&mut self) {
        self.outgoing = None;
        self.incoming.close();
    }
}
