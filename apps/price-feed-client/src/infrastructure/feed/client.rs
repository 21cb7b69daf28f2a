//! Price Feed Client
//!
//! Owns the lifecycle of the single streaming connection to the price feed:
//! connect, subscribe, reconnect with backoff, and disconnect.
//!
//! # State Machine
//!
//! ```text
//!  Idle ──connect──► Connecting ──open──► Open
//!                       │                  │
//!                       └──fail──► Closed ◄┘ lost / disconnect
//!                                  │    ▲
//!                      timer fires │    │ retry fails
//!                                  ▼    │
//!                               Connecting
//!
//!  Closed ──attempts exhausted──► Failed ──connect──► Connecting
//! ```
//!
//! # Tasks
//!
//! Every `connect()` (and every retry) runs as a spawned task that opens the
//! stream, subscribes, and reads frames until the stream drops or the
//! session is cancelled. Reconnects are scheduled as separate timer tasks.
//! All of them share one `CancellationToken` per connect cycle; `disconnect`
//! cancels it under the control lock, and every task re-checks the token
//! under that same lock before changing state, so a cancelled timer can
//! never start another attempt.
//!
//! At most one stream is open at a time: a task must hold the connection
//! slot for as long as its stream is open, and a new attempt waits for the
//! previous session to finish closing before it dials.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::codec::JsonCodec;
use super::messages::SubscribeRequest;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::websocket::WebSocketConnector;
use crate::application::ports::{FeedConnection, FeedConnector, TransportError};
use crate::application::services::TickProcessor;
use crate::domain::alert::{
    AlertCondition, AlertKey, AlertStore, AlertStoreStats, NewAlert, PriceAlert,
};
use crate::domain::streaming::{ConnectionState, MaxReconnectAttemptsReached, StateTransition};
use crate::infrastructure::broadcast::{EventHub, EventHubConfig, SharedEventHub};
use crate::infrastructure::config::{ApiKey, FeedConfig};
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors returned by client operations.
///
/// Connection failures are never returned; they drive the reconnect policy
/// and surface through the event hub.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// `connect` was called outside a Tokio runtime.
    #[error("no Tokio runtime available to drive the connection")]
    RuntimeUnavailable,
}

// =============================================================================
// Client Configuration
// =============================================================================

/// Configuration for the price feed client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Stream endpoint URL.
    pub endpoint: String,
    /// API key sent with every subscribe request.
    pub api_key: ApiKey,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Event channel capacities.
    pub events: EventHubConfig,
}

impl ClientConfig {
    /// Create a new configuration with default backoff and capacities.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            reconnect: ReconnectConfig::default(),
            events: EventHubConfig::default(),
        }
    }

    /// Create configuration from the loaded `FeedConfig`.
    #[must_use]
    pub fn from_feed_config(config: &FeedConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            reconnect: ReconnectConfig::from_settings(&config.reconnect),
            events: EventHubConfig::with_capacity(config.event_capacity),
        }
    }

    /// Override the reconnection configuration.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// Instructions from the public API to the task owning the open stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionCommand {
    /// Send the current tracked token set.
    Resubscribe,
}

/// Why a session stopped reading.
#[derive(Debug)]
enum SessionEnd {
    /// `disconnect` (or a fresh `connect`) cancelled the session.
    Cancelled,
    /// The stream failed or the peer closed it.
    Lost(TransportError),
}

/// Mutable lifecycle state, guarded by one lock.
#[derive(Debug)]
struct Control {
    state: ConnectionState,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
    commands: Option<mpsc::UnboundedSender<SessionCommand>>,
}

struct Inner {
    endpoint: String,
    api_key: ApiKey,
    connector: Arc<dyn FeedConnector>,
    alerts: Arc<AlertStore>,
    events: SharedEventHub,
    processor: TickProcessor,
    codec: JsonCodec,
    connection_slot: Arc<tokio::sync::Mutex<()>>,
    control: Mutex<Control>,
}

// =============================================================================
// Price Feed Client
// =============================================================================

/// Streaming price feed client with price alerts.
///
/// Cheap to clone; all clones drive the same connection, alert store, and
/// event hub.
///
/// # Example
///
/// ```rust,no_run
/// use price_feed_client::{ApiKey, ClientConfig, NewAlert, PriceFeedClient};
/// use rust_decimal::Decimal;
///
/// # async fn run() -> Result<(), price_feed_client::ClientError> {
/// let client = PriceFeedClient::new(ClientConfig::new(
///     "wss://prices.example.com/ws",
///     ApiKey::new("secret"),
/// ));
///
/// let mut alerts = client.events().alerts_triggered_rx();
/// client.add_alert(NewAlert::above("ETH", "ethereum", Decimal::from(4_000)));
/// client.connect()?;
///
/// if let Ok(alert) = alerts.recv().await {
///     println!("{} crossed {}", alert.token, alert.target_price);
/// }
/// client.disconnect();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PriceFeedClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PriceFeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceFeedClient")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PriceFeedClient {
    /// Create a client that connects over WebSocket.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(WebSocketConnector::new()))
    }

    /// Create a client over a custom transport.
    #[must_use]
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn FeedConnector>) -> Self {
        let alerts = Arc::new(AlertStore::new());
        let events: SharedEventHub = Arc::new(EventHub::new(config.events));
        let processor = TickProcessor::new(Arc::clone(&alerts), Arc::clone(&events));

        Self {
            inner: Arc::new(Inner {
                endpoint: config.endpoint,
                api_key: config.api_key,
                connector,
                alerts,
                events,
                processor,
                codec: JsonCodec::new(),
                connection_slot: Arc::new(tokio::sync::Mutex::new(())),
                control: Mutex::new(Control {
                    state: ConnectionState::Idle,
                    policy: ReconnectPolicy::new(config.reconnect),
                    cancel: CancellationToken::new(),
                    commands: None,
                }),
            }),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start connecting to the feed.
    ///
    /// Returns immediately; the connection is opened on a spawned task. A
    /// no-op while already connecting or open. From `Closed` or `Failed`
    /// this cancels any pending retry and starts a fresh cycle with the
    /// attempt counter reset.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::RuntimeUnavailable` when called outside a Tokio
    /// runtime.
    pub fn connect(&self) -> Result<(), ClientError> {
        let runtime = Handle::try_current().map_err(|_| ClientError::RuntimeUnavailable)?;

        let cancel = {
            let mut control = self.inner.control.lock();
            if matches!(
                control.state,
                ConnectionState::Connecting | ConnectionState::Open
            ) {
                tracing::debug!(state = %control.state, "Connect ignored, connection already active");
                return Ok(());
            }

            control.cancel.cancel();
            control.cancel = CancellationToken::new();
            control.commands = None;
            control.policy.reset();
            self.inner.transition(&mut control, ConnectionState::Connecting);
            control.cancel.clone()
        };

        runtime.spawn(run_attempt(Arc::clone(&self.inner), cancel).instrument(session_span()));
        Ok(())
    }

    /// Close the stream and suppress any pending reconnect.
    ///
    /// Takes effect synchronously: once this returns, no scheduled retry
    /// will start. Idempotent; a no-op from `Idle` and `Failed`.
    pub fn disconnect(&self) {
        let mut control = self.inner.control.lock();
        control.cancel.cancel();
        control.commands = None;

        match control.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                tracing::info!("Disconnecting from price feed");
                self.inner.transition(&mut control, ConnectionState::Closed);
            }
            ConnectionState::Closed => {
                tracing::debug!("Disconnect while closed, pending retry cancelled");
            }
            ConnectionState::Idle | ConnectionState::Failed => {}
        }
    }

    /// Disconnect and wait until the open stream, if any, has been closed.
    ///
    /// A session holds the connection slot until its close handshake is
    /// done, so acquiring the slot here means nothing is left open.
    pub async fn shutdown(&self) {
        self.disconnect();
        let _slot = self.inner.connection_slot.lock().await;
        tracing::debug!("Price feed connection released");
    }

    /// Send the current tracked token set to the open stream.
    ///
    /// Returns `false` when the stream is not open. Nothing is queued; the
    /// next successful open subscribes with the live set anyway.
    pub fn subscribe(&self) -> bool {
        let control = self.inner.control.lock();
        if !control.state.is_open() {
            return false;
        }

        control
            .commands
            .as_ref()
            .is_some_and(|tx| tx.send(SessionCommand::Resubscribe).is_ok())
    }

    // =========================================================================
    // Alert Management
    // =========================================================================

    /// Add an alert and resubscribe.
    pub fn add_alert(&self, alert: NewAlert) -> PriceAlert {
        let stored = self.inner.alerts.add(alert);
        metrics::set_active_alerts(self.inner.alerts.len());

        tracing::info!(
            token = %stored.token,
            network = %stored.network,
            condition = %stored.condition,
            threshold = %stored.threshold,
            "Price alert added"
        );

        self.subscribe();
        stored
    }

    /// Remove every alert matching the identity exactly.
    ///
    /// Returns the number removed; zero is not an error. Resubscribes when
    /// the tracked token set shrank.
    pub fn remove_alert(
        &self,
        token: &str,
        network: &str,
        condition: AlertCondition,
        threshold: Decimal,
    ) -> usize {
        let key = AlertKey::new(token, network, condition, threshold);
        let removal = self.inner.alerts.remove_tracking(&key);

        if removal.removed > 0 {
            metrics::set_active_alerts(self.inner.alerts.len());
            tracing::info!(
                %token,
                %network,
                %condition,
                %threshold,
                removed = removal.removed,
                "Price alerts removed"
            );

            if removal.token_untracked {
                self.subscribe();
            }
        }

        removal.removed
    }

    /// Remove all alerts. Returns the number removed.
    pub fn clear_alerts(&self) -> usize {
        let removed = self.inner.alerts.clear();
        metrics::set_active_alerts(0);

        if removed > 0 {
            tracing::info!(removed, "Price alerts cleared");
            self.subscribe();
        }

        removed
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.control.lock().state
    }

    /// Get the number of reconnect attempts in the current cycle.
    #[must_use]
    pub fn reconnect_attempt(&self) -> u32 {
        self.inner.control.lock().policy.attempt_count()
    }

    /// Get a snapshot of all alerts.
    #[must_use]
    pub fn alerts(&self) -> Vec<PriceAlert> {
        self.inner.alerts.snapshot()
    }

    /// Get alert store statistics.
    #[must_use]
    pub fn alert_stats(&self) -> AlertStoreStats {
        self.inner.alerts.stats()
    }

    /// Get the event hub to subscribe to client events.
    #[must_use]
    pub fn events(&self) -> &SharedEventHub {
        &self.inner.events
    }
}

// =============================================================================
// State Transitions
// =============================================================================

impl Inner {
    /// Move to `next`, publishing the transition. Illegal moves are ignored.
    fn transition(&self, control: &mut Control, next: ConnectionState) -> bool {
        let from = control.state;
        if !from.can_transition_to(next) {
            tracing::warn!(%from, to = %next, "Ignoring illegal connection state transition");
            return false;
        }

        control.state = next;
        metrics::set_connection_state(next);
        tracing::debug!(%from, to = %next, "Connection state changed");

        let _ = self.events.publish_state_change(StateTransition {
            from,
            to: next,
            at: Utc::now(),
        });
        true
    }

    /// Mark the stream open and hand back the command channel.
    ///
    /// Returns `None` when the cycle was cancelled while dialing.
    fn on_open(&self, cancel: &CancellationToken) -> Option<mpsc::UnboundedReceiver<SessionCommand>> {
        let mut control = self.control.lock();
        if cancel.is_cancelled() {
            return None;
        }

        control.policy.reset();
        let (tx, rx) = mpsc::unbounded_channel();
        // Subscribe first thing on every open
        let _ = tx.send(SessionCommand::Resubscribe);
        control.commands = Some(tx);
        self.transition(&mut control, ConnectionState::Open);

        Some(rx)
    }

    /// Re-enter `Connecting` for a scheduled retry unless it was cancelled.
    fn begin_retry(&self, cancel: &CancellationToken) -> bool {
        let mut control = self.control.lock();
        if cancel.is_cancelled() || control.state != ConnectionState::Closed {
            return false;
        }
        self.transition(&mut control, ConnectionState::Connecting)
    }

    async fn send_subscribe(&self, connection: &mut dyn FeedConnection) -> Result<(), TransportError> {
        let request = SubscribeRequest::new(self.api_key.expose(), self.alerts.tracked_tokens());
        let payload = match self.codec.encode_subscribe(&request) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode subscribe request");
                return Ok(());
            }
        };

        connection.send_text(payload).await?;
        metrics::record_subscription_sent();
        tracing::info!(tokens = ?request.tokens, "Subscribed to price feed");

        Ok(())
    }

    async fn run_session(
        &self,
        connection: &mut dyn FeedConnection,
        commands: &mut mpsc::UnboundedReceiver<SessionCommand>,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => return SessionEnd::Cancelled,

                Some(command) = commands.recv() => match command {
                    SessionCommand::Resubscribe => {
                        if let Err(e) = self.send_subscribe(connection).await {
                            return SessionEnd::Lost(e);
                        }
                    }
                },

                frame = connection.next_text() => match frame {
                    Some(Ok(text)) => {
                        self.processor.process_frame(&text);
                    }
                    Some(Err(e)) => return SessionEnd::Lost(e),
                    None => return SessionEnd::Lost(TransportError::Closed),
                },
            }
        }
    }
}

// =============================================================================
// Connection Tasks
// =============================================================================

fn session_span() -> tracing::Span {
    tracing::info_span!("feed_session", session_id = %Uuid::new_v4())
}

/// Open the stream and run it until it drops or the cycle is cancelled.
async fn run_attempt(inner: Arc<Inner>, cancel: CancellationToken) {
    let slot = tokio::select! {
        () = cancel.cancelled() => return,
        slot = Arc::clone(&inner.connection_slot).lock_owned() => slot,
    };

    tracing::info!(url = %inner.endpoint, "Connecting to price feed");
    metrics::record_connection_attempt();

    let opened = tokio::select! {
        () = cancel.cancelled() => return,
        result = inner.connector.connect(&inner.endpoint) => result,
    };

    let mut connection = match opened {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(error = %e, "Price feed connection failed");
            drop(slot);
            on_connection_lost(&inner, &cancel);
            return;
        }
    };

    let Some(mut commands) = inner.on_open(&cancel) else {
        connection.close().await;
        return;
    };
    tracing::info!("Price feed connection open");

    match inner
        .run_session(connection.as_mut(), &mut commands, &cancel)
        .await
    {
        SessionEnd::Cancelled => {
            tracing::info!("Price feed session cancelled, closing stream");
            connection.close().await;
        }
        SessionEnd::Lost(e) => {
            tracing::warn!(error = %e, "Price feed connection lost");
            drop(connection);
            drop(slot);
            on_connection_lost(&inner, &cancel);
        }
    }
}

/// Record a dropped stream and schedule the next attempt, or give up.
fn on_connection_lost(inner: &Arc<Inner>, cancel: &CancellationToken) {
    let mut control = inner.control.lock();
    if cancel.is_cancelled() {
        return;
    }

    control.commands = None;
    inner.transition(&mut control, ConnectionState::Closed);

    if let Some(delay) = control.policy.next_delay() {
        let attempt = control.policy.attempt_count();
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis(),
            "Reconnecting to price feed"
        );
        metrics::record_reconnect_scheduled();
        tokio::spawn(retry_after(Arc::clone(inner), cancel.clone(), delay));
    } else {
        let attempts = control.policy.attempt_count();
        inner.transition(&mut control, ConnectionState::Failed);
        metrics::record_reconnects_exhausted();
        tracing::error!(attempts, "Maximum reconnection attempts reached");

        let _ = inner
            .events
            .publish_max_reconnect_attempts_reached(MaxReconnectAttemptsReached {
                attempts,
                at: Utc::now(),
            });
    }
}

async fn retry_after(inner: Arc<Inner>, cancel: CancellationToken, delay: Duration) {
    tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!("Pending reconnect cancelled");
            return;
        }
        () = tokio::time::sleep(delay) => {}
    }

    if inner.begin_retry(&cancel) {
        run_attempt(inner, cancel).instrument(session_span()).await;
    }
}

// =============================================================================
// Tests
// =============================================================================
