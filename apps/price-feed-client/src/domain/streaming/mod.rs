//! Price Streaming Types
//!
//! Core domain types for the price stream: ticks, connection states, and
//! the events published to external collaborators. These types are
//! codec-agnostic; wire formats live in the infrastructure layer.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::alert::{AlertCondition, Instrument, TriggeredAlert};

// =============================================================================
// Price Tick
// =============================================================================

/// One price observation for an instrument. Not retained after processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTick {
    /// Instrument being priced.
    pub instrument: Instrument,
    /// Observed price.
    pub price: Decimal,
}

impl PriceTick {
    /// Create a new tick.
    #[must_use]
    pub const fn new(instrument: Instrument, price: Decimal) -> Self {
        Self { instrument, price }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// Opening the stream.
    Connecting,
    /// Stream open and subscribed.
    Open,
    /// Stream closed; a retry may be pending.
    Closed,
    /// Retries exhausted. Only an explicit connect leaves this state.
    Failed,
}

impl ConnectionState {
    /// Check whether moving to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle | Self::Closed | Self::Failed, Self::Connecting)
                | (Self::Connecting, Self::Open | Self::Closed)
                | (Self::Open, Self::Closed)
                | (Self::Closed, Self::Failed)
        )
    }

    /// Check if the stream is open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Get the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Events
// =============================================================================

/// A valid price tick, published for every tick whether or not an alert fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    /// Token identifier.
    pub token: String,
    /// Network identifier.
    pub network: String,
    /// Observed price.
    pub price: Decimal,
    /// When the tick was processed.
    pub received_at: DateTime<Utc>,
}

impl From<&PriceTick> for PriceUpdate {
    fn from(tick: &PriceTick) -> Self {
        Self {
            token: tick.instrument.token.clone(),
            network: tick.instrument.network.clone(),
            price: tick.price,
            received_at: Utc::now(),
        }
    }
}

/// An alert crossed its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertTriggered {
    /// Token identifier.
    pub token: String,
    /// Network identifier.
    pub network: String,
    /// Crossing direction of the alert.
    pub condition: AlertCondition,
    /// The alert's threshold.
    pub target_price: Decimal,
    /// The tick price that satisfied the alert.
    pub current_price: Decimal,
    /// When the alert fired.
    pub triggered_at: DateTime<Utc>,
}

impl From<&TriggeredAlert> for AlertTriggered {
    fn from(triggered: &TriggeredAlert) -> Self {
        Self {
            token: triggered.alert.token.clone(),
            network: triggered.alert.network.clone(),
            condition: triggered.alert.condition,
            target_price: triggered.alert.threshold,
            current_price: triggered.tick.price,
            triggered_at: Utc::now(),
        }
    }
}

/// Reconnect attempts are exhausted and the client stopped retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxReconnectAttemptsReached {
    /// Number of reconnect attempts made in the failed cycle.
    pub attempts: u32,
    /// When the client gave up.
    pub at: DateTime<Utc>,
}

/// A connection state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    /// Previous state.
    pub from: ConnectionState,
    /// New state.
    pub to: ConnectionState,
    /// When the transition happened.
    pub at: DateTime<Utc>,
}

/// Any event published by the client, in publication order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum FeedEvent {
    /// A price tick was processed.
    PriceUpdate(PriceUpdate),
    /// An alert fired.
    AlertTriggered(AlertTriggered),
    /// Reconnect attempts are exhausted.
    MaxReconnectAttemptsReached(MaxReconnectAttemptsReached),
    /// The connection changed state.
    StateChanged(StateTransition),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use ConnectionState::{Closed, Connecting, Failed, Idle, Open};

        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Open));
        assert!(Connecting.can_transition_to(Closed));
        assert!(Open.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Connecting));
        assert!(Closed.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Connecting));
    }

    #[test]
    fn illegal_transitions() {
        use ConnectionState::{Closed, Connecting, Failed, Idle, Open};

        assert!(!Idle.can_transition_to(Open));
        assert!(!Open.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Open));
        assert!(!Closed.can_transition_to(Open));
        assert!(!Open.can_transition_to(Connecting));
    }

    #[test]
    fn default_state_is_idle() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
        assert!(!ConnectionState::Idle.is_open());
        assert!(ConnectionState::Open.is_open());
    }

    #[test]
    fn alert_triggered_uses_wire_names() {
        let event = AlertTriggered {
            token: "ETH".to_string(),
            network: "ethereum".to_string(),
            condition: AlertCondition::Above,
            target_price: Decimal::from(100),
            current_price: Decimal::from(101),
            triggered_at: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["condition"], "above");
        assert!(json.get("targetPrice").is_some());
        assert!(json.get("currentPrice").is_some());
    }

    #[test]
    fn price_update_from_tick() {
        let tick = PriceTick::new(Instrument::new("ETH", "ethereum"), Decimal::from(42));
        let update = PriceUpdate::from(&tick);

        assert_eq!(update.token, "ETH");
        assert_eq!(update.network, "ethereum");
        assert_eq!(update.price, Decimal::from(42));
    }
}
