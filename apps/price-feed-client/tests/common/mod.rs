//! In-memory price feed used by the integration tests.
//!
//! The fake hands out connections according to a script (accept or fail,
//! defaulting to fail), records when each dial happened on the Tokio clock,
//! and lets the test push frames into, or drop, the current connection.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use price_feed_client::{
    ApiKey, ClientConfig, ConnectionState, FeedConnection, FeedConnector, PriceFeedClient,
    StateTransition, TransportError,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

/// What the next dial does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dial {
    Accept,
    Fail,
}

#[derive(Default)]
struct Shared {
    script: Mutex<VecDeque<Dial>>,
    dials: Mutex<Vec<Instant>>,
    server: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

/// Test-side handle to the fake feed.
pub struct FakeFeed {
    shared: Arc<Shared>,
    sent_tx: mpsc::UnboundedSender<String>,
    /// Frames the client wrote, in order.
    pub sent: mpsc::UnboundedReceiver<String>,
}

impl FakeFeed {
    pub fn new() -> Self {
        let (sent_tx, sent) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared::default()),
            sent_tx,
            sent,
        }
    }

    /// Queue dial outcomes.
    pub fn script(&self, dials: impl IntoIterator<Item = Dial>) {
        self.shared.script.lock().extend(dials);
    }

    pub fn connector(&self) -> Arc<dyn FeedConnector> {
        Arc::new(FakeConnector {
            shared: Arc::clone(&self.shared),
            sent_tx: self.sent_tx.clone(),
        })
    }

    /// Build a client over this feed with default backoff.
    pub fn client(&self) -> PriceFeedClient {
        PriceFeedClient::with_connector(
            ClientConfig::new("ws://fake.feed/stream", ApiKey::new("test-key")),
            self.connector(),
        )
    }

    /// Number of dials so far.
    pub fn dial_count(&self) -> usize {
        self.shared.dials.lock().len()
    }

    /// Clock readings of every dial.
    pub fn dial_times(&self) -> Vec<Instant> {
        self.shared.dials.lock().clone()
    }

    /// Deliver a frame on the current connection.
    pub fn push(&self, frame: &str) {
        let server = self.shared.server.lock();
        server
            .as_ref()
            .expect("no open connection")
            .send(frame.to_string())
            .expect("connection reader gone");
    }

    /// Close the current connection from the server side.
    pub fn drop_connection(&self) {
        self.shared.server.lock().take();
    }

    /// Next subscribe request the client wrote, parsed.
    pub async fn next_subscribe(&mut self) -> serde_json::Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.sent.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("sent channel closed");
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "subscribe");
        value
    }
}

struct FakeConnector {
    shared: Arc<Shared>,
    sent_tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FeedConnector for FakeConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Box<dyn FeedConnection>, TransportError> {
        self.shared.dials.lock().push(Instant::now());

        let dial = self.shared.script.lock().pop_front().unwrap_or(Dial::Fail);
        match dial {
            Dial::Fail => Err(TransportError::ConnectFailed("connection refused".to_string())),
            Dial::Accept => {
                let (server_tx, inbound) = mpsc::unbounded_channel();
                *self.shared.server.lock() = Some(server_tx);
                Ok(Box::new(FakeConnection {
                    inbound,
                    sent_tx: self.sent_tx.clone(),
                }))
            }
        }
    }
}

struct FakeConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    sent_tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FeedConnection for FakeConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sent_tx
            .send(text)
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

/// Wait until the client reports `target`, returning the transitions seen.
pub async fn wait_for_state(
    rx: &mut broadcast::Receiver<StateTransition>,
    target: ConnectionState,
) -> Vec<StateTransition> {
    let mut seen = Vec::new();
    loop {
        let transition = tokio::time::timeout(Duration::from_secs(600), rx.recv())
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
        seen.push(transition);
        if transition.to == target {
            return seen;
        }
    }
}
