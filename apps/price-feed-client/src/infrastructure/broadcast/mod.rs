//! Event Broadcast Hub
//!
//! Implements the client's publish/subscribe surface using tokio broadcast
//! channels for fan-out to any number of subscribers.
//!
//! # Architecture
//!
//! The `EventHub` provides one typed channel per event kind:
//! - Price updates for every valid tick
//! - Alert triggers
//! - Reconnect exhaustion
//! - Connection state transitions
//!
//! Every event is also sent on an ordered `events` channel carrying
//! `FeedEvent`, so a consumer that needs to correlate an alert with the
//! price update that caused it can read a single stream.
//!
//! Subscribers own their receivers. A subscriber that panics or falls behind
//! only affects its own receiver (slow receivers observe `Lagged`); the
//! publisher never blocks and never fails when nobody is listening.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::domain::streaming::{
    AlertTriggered, FeedEvent, MaxReconnectAttemptsReached, PriceUpdate, StateTransition,
};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for event channel capacities.
#[derive(Debug, Clone, Copy)]
pub struct EventHubConfig {
    /// Capacity for the price update channel.
    pub price_updates_capacity: usize,
    /// Capacity for the alert channel.
    pub alerts_capacity: usize,
    /// Capacity for control channels (state changes, reconnect exhaustion).
    pub control_capacity: usize,
    /// Capacity for the ordered all-events channel.
    pub events_capacity: usize,
}

impl Default for EventHubConfig {
    fn default() -> Self {
        Self {
            price_updates_capacity: 1_024,
            alerts_capacity: 256,
            control_capacity: 64,
            events_capacity: 1_024,
        }
    }
}

impl EventHubConfig {
    /// Use the same capacity for the data channels.
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            price_updates_capacity: capacity,
            alerts_capacity: capacity,
            control_capacity: 64,
            events_capacity: capacity,
        }
    }
}

// =============================================================================
// Event Hub
// =============================================================================

/// Central hub for all client event channels.
///
/// # Example
///
/// ```rust
/// use price_feed_client::infrastructure::broadcast::{EventHub, EventHubConfig};
///
/// let hub = EventHub::new(EventHubConfig::default());
///
/// // Get a receiver for alert triggers
/// let mut rx = hub.alerts_triggered_rx();
/// assert_eq!(hub.alerts_triggered_receiver_count(), 1);
/// ```
#[derive(Debug)]
#[allow(clippy::struct_field_names)]
pub struct EventHub {
    price_updates_tx: broadcast::Sender<PriceUpdate>,
    alerts_triggered_tx: broadcast::Sender<AlertTriggered>,
    max_reconnect_tx: broadcast::Sender<MaxReconnectAttemptsReached>,
    state_changes_tx: broadcast::Sender<StateTransition>,
    events_tx: broadcast::Sender<FeedEvent>,
}

impl EventHub {
    /// Create a new event hub with the given configuration.
    #[must_use]
    pub fn new(config: EventHubConfig) -> Self {
        Self {
            price_updates_tx: broadcast::channel(config.price_updates_capacity.max(1)).0,
            alerts_triggered_tx: broadcast::channel(config.alerts_capacity.max(1)).0,
            max_reconnect_tx: broadcast::channel(config.control_capacity.max(1)).0,
            state_changes_tx: broadcast::channel(config.control_capacity.max(1)).0,
            events_tx: broadcast::channel(config.events_capacity.max(1)).0,
        }
    }

    /// Create a new event hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(EventHubConfig::default())
    }

    // =========================================================================
    // Price Update Channel
    // =========================================================================

    /// Publish a price update to all subscribers.
    ///
    /// Returns the number of receivers on the typed channel, or `None` if
    /// there are no active receivers.
    pub fn publish_price_update(&self, update: PriceUpdate) -> Option<usize> {
        let _ = self.events_tx.send(FeedEvent::PriceUpdate(update.clone()));
        self.price_updates_tx.send(update).ok()
    }

    /// Get a new receiver for price updates.
    #[must_use]
    pub fn price_updates_rx(&self) -> broadcast::Receiver<PriceUpdate> {
        self.price_updates_tx.subscribe()
    }

    /// Get the number of active price update receivers.
    #[must_use]
    pub fn price_updates_receiver_count(&self) -> usize {
        self.price_updates_tx.receiver_count()
    }

    // =========================================================================
    // Alert Channel
    // =========================================================================

    /// Publish an alert trigger to all subscribers.
    pub fn publish_alert_triggered(&self, alert: AlertTriggered) -> Option<usize> {
        let _ = self.events_tx.send(FeedEvent::AlertTriggered(alert.clone()));
        self.alerts_triggered_tx.send(alert).ok()
    }

    /// Get a new receiver for alert triggers.
    #[must_use]
    pub fn alerts_triggered_rx(&self) -> broadcast::Receiver<AlertTriggered> {
        self.alerts_triggered_tx.subscribe()
    }

    /// Get the number of active alert receivers.
    #[must_use]
    pub fn alerts_triggered_receiver_count(&self) -> usize {
        self.alerts_triggered_tx.receiver_count()
    }

    // =========================================================================
    // Reconnect Exhaustion Channel
    // =========================================================================

    /// Publish reconnect exhaustion to all subscribers.
    pub fn publish_max_reconnect_attempts_reached(
        &self,
        event: MaxReconnectAttemptsReached,
    ) -> Option<usize> {
        let _ = self
            .events_tx
            .send(FeedEvent::MaxReconnectAttemptsReached(event));
        self.max_reconnect_tx.send(event).ok()
    }

    /// Get a new receiver for reconnect exhaustion.
    #[must_use]
    pub fn max_reconnect_attempts_rx(&self) -> broadcast::Receiver<MaxReconnectAttemptsReached> {
        self.max_reconnect_tx.subscribe()
    }

    /// Get the number of active reconnect exhaustion receivers.
    #[must_use]
    pub fn max_reconnect_attempts_receiver_count(&self) -> usize {
        self.max_reconnect_tx.receiver_count()
    }

    // =========================================================================
    // State Change Channel
    // =========================================================================

    /// Publish a connection state transition.
    pub fn publish_state_change(&self, transition: StateTransition) -> Option<usize> {
        let _ = self.events_tx.send(FeedEvent::StateChanged(transition));
        self.state_changes_tx.send(transition).ok()
    }

    /// Get a new receiver for connection state transitions.
    #[must_use]
    pub fn state_changes_rx(&self) -> broadcast::Receiver<StateTransition> {
        self.state_changes_tx.subscribe()
    }

    /// Get the number of active state change receivers.
    #[must_use]
    pub fn state_changes_receiver_count(&self) -> usize {
        self.state_changes_tx.receiver_count()
    }

    // =========================================================================
    // Ordered Event Channel
    // =========================================================================

    /// Get a new receiver for every event in publication order.
    #[must_use]
    pub fn events_rx(&self) -> broadcast::Receiver<FeedEvent> {
        self.events_tx.subscribe()
    }

    /// Get the number of active all-events receivers.
    #[must_use]
    pub fn events_receiver_count(&self) -> usize {
        self.events_tx.receiver_count()
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get statistics about all channels.
    #[must_use]
    pub fn stats(&self) -> EventHubStats {
        EventHubStats {
            price_updates_receivers: self.price_updates_receiver_count(),
            alerts_triggered_receivers: self.alerts_triggered_receiver_count(),
            max_reconnect_receivers: self.max_reconnect_attempts_receiver_count(),
            state_changes_receivers: self.state_changes_receiver_count(),
            events_receivers: self.events_receiver_count(),
        }
    }
}

/// Shared event hub reference.
pub type SharedEventHub = Arc<EventHub>;

/// Statistics about event channels.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct EventHubStats {
    /// Number of price update receivers.
    pub price_updates_receivers: usize,
    /// Number of alert receivers.
    pub alerts_triggered_receivers: usize,
    /// Number of reconnect exhaustion receivers.
    pub max_reconnect_receivers: usize,
    /// Number of state change receivers.
    pub state_changes_receivers: usize,
    /// Number of all-events receivers.
    pub events_receivers: usize,
}

impl EventHubStats {
    /// Get total number of receivers across all channels.
    #[must_use]
    pub const fn total_receivers(&self) -> usize {
        self.price_updates_receivers
            + self.alerts_triggered_receivers
            + self.max_reconnect_receivers
            + self.state_changes_receivers
            + self.events_receivers
    }
}

// =============================================================================
// Tests
// =============================================================================
