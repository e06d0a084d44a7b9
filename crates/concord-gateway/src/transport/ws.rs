//! Websocket transport over tokio-tungstenite

use super::{GatewayConnector, Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Build the full gateway URL with protocol parameters.
#[must_use]
pub fn gateway_url(base: &str, compress: bool) -> String {
    let mut url = format!("{}?v=1&encoding=json", base.trim_end_matches('/'));
    if compress {
        url.push_str("&compress=zlib-stream");
    }
    url
}

/// Production connector dialing the gateway websocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Connector for a fully-formed gateway URL (see [`gateway_url`]).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl GatewayConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, TransportError> {
        tracing::debug!(url = %self.url, "establishing gateway transport");
        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        Ok(Box::new(WsTransport { inner: stream }))
    }
}

struct WsTransport {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, payload: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(payload))
            .await
            .map_err(TransportError::from)
    }

    async fn recv(&mut self) -> Option<TransportEvent> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Binary(chunk)) => return Some(TransportEvent::Binary(chunk)),
                Ok(Message::Text(text)) => return Some(TransportEvent::Text(text)),
                Ok(Message::Close(frame)) => {
                    let code = frame.as_ref().map(|f| u16::from(f.code));
                    let reason = frame.map(|f| f.reason.into_owned());
                    return Some(TransportEvent::Closed { code, reason });
                }
                // Tungstenite answers pings internally; nothing to surface.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "websocket read error");
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.inner.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_url_with_compression() {
        assert_eq!(
            gateway_url("wss://gateway.concord.chat/", true),
            "wss://gateway.concord.chat?v=1&encoding=json&compress=zlib-stream"
        );
    }

    #[test]
    fn test_gateway_url_without_compression() {
        assert_eq!(
            gateway_url("wss://gateway.concord.chat", false),
            "wss://gateway.concord.chat?v=1&encoding=json"
        );
    }
}
