//! Transport seam
//!
//! The gateway core only ever sees pre-established duplex streams through
//! the [`Transport`] trait; [`WsConnector`] is the production implementation
//! over tokio-tungstenite. Tests substitute channel-backed transports.

mod ws;

pub use ws::{gateway_url, WsConnector};

use async_trait::async_trait;

/// Transport-level errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Underlying websocket failure.
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// The peer is gone.
    #[error("transport closed")]
    Closed,
}

/// Something the transport delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A compressed binary chunk. Boundaries are arbitrary.
    Binary(Vec<u8>),

    /// An uncompressed text payload.
    Text(String),

    /// The peer closed the connection.
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
}

/// One established duplex gateway stream.
#[async_trait]
pub trait Transport: Send {
    /// Send one serialized payload.
    async fn send(&mut self, payload: String) -> Result<(), TransportError>;

    /// Receive the next chunk. `None` means the stream dropped without a
    /// close frame.
    async fn recv(&mut self) -> Option<TransportEvent>;

    /// Close the stream. Best effort; errors are swallowed.
    async fn close(&mut self);
}

/// Establishes fresh transports for (re)connects.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError>;
}
