//! WebSocket Feed Adapter
//!
//! `FeedConnector` implementation over `tokio-tungstenite`. TLS endpoints
//! (`wss://`) go through rustls with the webpki root store.
//!
//! # Protocol
//!
//! Text frames carry one JSON message each. Binary frames are accepted and
//! decoded as UTF-8 (lossy) so the codec can reject them with a proper
//! reason. Pings are answered inline; control frames never surface.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{FeedConnection, FeedConnector, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Connector
// =============================================================================

/// Opens WebSocket connections to the price feed.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FeedConnector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn FeedConnection>, TransportError> {
        tracing::debug!(url = %endpoint, "Opening WebSocket");

        let (stream, response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(WebSocketConnection { stream }))
    }
}

// =============================================================================
// Connection
// =============================================================================

/// A single open WebSocket stream.
pub struct WebSocketConnection {
    stream: WsStream,
}

impl std::fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl FeedConnection for WebSocketConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Ok(Message::Ping(payload)) => {
                    if let Err(e) = self.stream.send(Message::Pong(payload)).await {
                        return Some(Err(TransportError::SendFailed(e.to_string())));
                    }
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "Feed sent close frame");
                    return None;
                }
                Ok(Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(TransportError::ReceiveFailed(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Error while closing WebSocket");
        }
    }
}
