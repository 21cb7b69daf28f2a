//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedConnector`: Opens a streaming connection to the price feed
//! - `FeedConnection`: A single open text-frame stream

use async_trait::async_trait;

/// Errors raised by feed transports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
}

/// Opens connections to the upstream price feed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Open a connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectFailed` if the stream cannot be opened.
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn FeedConnection>, TransportError>;
}

/// An open, bidirectional text-frame stream.
///
/// `next_text` must be cancel safe: the connection manager polls it inside
/// `tokio::select!` alongside outbound commands.
#[async_trait]
pub trait FeedConnection: Send {
    /// Send a text frame.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::SendFailed` if the frame cannot be written.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Receive the next text frame.
    ///
    /// Returns `None` once the peer closed the stream.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the stream.
    async fn close(&mut self);
}
