//! Price Alert Types and Store
//!
//! Domain types for user-defined price alerts and the in-memory store that
//! evaluates ticks against them.
//!
//! # Design
//!
//! The alert store tracks:
//! - Alerts grouped by instrument (token + network) for tick lookup
//! - Duplicate alerts with the same identity as independent entries
//! - A one-way `triggered` flag per alert
//!
//! A single lock guards the whole collection, so `match_and_mark` and the
//! mutation operations never interleave on the same entry. Two ticks racing
//! for the same alert cannot both report a trigger.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::streaming::PriceTick;

// =============================================================================
// Types
// =============================================================================

/// A priced instrument: a token on a specific network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument {
    /// Token identifier, opaque to the client.
    pub token: String,
    /// Chain or venue identifier, opaque to the client.
    pub network: String,
}

impl Instrument {
    /// Create a new instrument.
    #[must_use]
    pub fn new(token: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            network: network.into(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.token, self.network)
    }
}

/// Direction in which the price must cross the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    /// Fires when price >= threshold.
    Above,
    /// Fires when price <= threshold.
    Below,
}

impl AlertCondition {
    /// Check whether `price` satisfies this condition against `threshold`.
    ///
    /// Both directions are inclusive of the threshold.
    #[must_use]
    pub fn is_satisfied_by(self, price: Decimal, threshold: Decimal) -> bool {
        match self {
            Self::Above => price >= threshold,
            Self::Below => price <= threshold,
        }
    }

    /// Get the condition name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertCondition {
    type Err = ParseConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "above" => Ok(Self::Above),
            "below" => Ok(Self::Below),
            _ => Err(ParseConditionError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown alert condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown alert condition {0:?} (expected \"above\" or \"below\")")]
pub struct ParseConditionError(pub String);

/// Identity of an alert: instrument, condition, and threshold.
///
/// Alerts carry no synthetic id; removal matches on this tuple exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    /// Instrument the alert watches.
    pub instrument: Instrument,
    /// Crossing direction.
    pub condition: AlertCondition,
    /// Threshold price.
    pub threshold: Decimal,
}

impl AlertKey {
    /// Create an alert identity.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        network: impl Into<String>,
        condition: AlertCondition,
        threshold: Decimal,
    ) -> Self {
        Self {
            instrument: Instrument::new(token, network),
            condition,
            threshold,
        }
    }
}

/// Request to create an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlert {
    /// Token identifier.
    pub token: String,
    /// Network identifier.
    pub network: String,
    /// Crossing direction.
    pub condition: AlertCondition,
    /// Threshold price.
    pub threshold: Decimal,
}

impl NewAlert {
    /// Create a new alert request.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        network: impl Into<String>,
        condition: AlertCondition,
        threshold: Decimal,
    ) -> Self {
        Self {
            token: token.into(),
            network: network.into(),
            condition,
            threshold,
        }
    }

    /// Alert that fires once the price reaches `threshold` or higher.
    #[must_use]
    pub fn above(token: impl Into<String>, network: impl Into<String>, threshold: Decimal) -> Self {
        Self::new(token, network, AlertCondition::Above, threshold)
    }

    /// Alert that fires once the price reaches `threshold` or lower.
    #[must_use]
    pub fn below(token: impl Into<String>, network: impl Into<String>, threshold: Decimal) -> Self {
        Self::new(token, network, AlertCondition::Below, threshold)
    }

    /// Get the identity of the alert this request creates.
    #[must_use]
    pub fn key(&self) -> AlertKey {
        AlertKey::new(
            self.token.clone(),
            self.network.clone(),
            self.condition,
            self.threshold,
        )
    }
}

/// A tracked price alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlert {
    /// Token identifier.
    pub token: String,
    /// Network identifier.
    pub network: String,
    /// Crossing direction.
    pub condition: AlertCondition,
    /// Threshold price.
    pub threshold: Decimal,
    /// Whether the alert has fired. Set once, never reset.
    pub triggered: bool,
    /// When the alert was added.
    pub created_at: DateTime<Utc>,
}

impl PriceAlert {
    fn pending(alert: NewAlert) -> Self {
        Self {
            token: alert.token,
            network: alert.network,
            condition: alert.condition,
            threshold: alert.threshold,
            triggered: false,
            created_at: Utc::now(),
        }
    }

    /// Get the identity of this alert.
    #[must_use]
    pub fn key(&self) -> AlertKey {
        AlertKey::new(
            self.token.clone(),
            self.network.clone(),
            self.condition,
            self.threshold,
        )
    }

    fn has_identity(&self, key: &AlertKey) -> bool {
        self.condition == key.condition
            && self.threshold == key.threshold
            && self.token == key.instrument.token
            && self.network == key.instrument.network
    }
}

/// An alert that fired, together with the tick that satisfied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredAlert {
    /// The alert, already marked triggered.
    pub alert: PriceAlert,
    /// The tick that satisfied the alert's condition.
    pub tick: PriceTick,
}

// =============================================================================
// Alert Store
// =============================================================================

/// Alerts grouped by instrument, in insertion order within each group.
#[derive(Debug, Default)]
struct AlertBook {
    by_instrument: BTreeMap<Instrument, Vec<PriceAlert>>,
}

impl AlertBook {
    fn len(&self) -> usize {
        self.by_instrument.values().map(Vec::len).sum()
    }
}

/// Result of removing alerts by identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertRemoval {
    /// Number of alerts removed.
    pub removed: usize,
    /// The token no longer has alerts on any network.
    pub token_untracked: bool,
}

/// Concurrency-safe store of active price alerts.
///
/// # Example
///
/// ```rust
/// use price_feed_client::domain::alert::{AlertStore, Instrument, NewAlert};
/// use price_feed_client::domain::streaming::PriceTick;
/// use rust_decimal::Decimal;
///
/// let store = AlertStore::new();
/// store.add(NewAlert::above("ETH", "ethereum", Decimal::from(100)));
///
/// // Inclusive boundary: a tick at exactly the threshold fires
/// let tick = PriceTick::new(Instrument::new("ETH", "ethereum"), Decimal::from(100));
/// assert_eq!(store.match_and_mark(&tick).len(), 1);
///
/// // Already triggered - does not fire again
/// let tick = PriceTick::new(Instrument::new("ETH", "ethereum"), Decimal::from(150));
/// assert!(store.match_and_mark(&tick).is_empty());
/// ```
#[derive(Debug, Default)]
pub struct AlertStore {
    book: Mutex<AlertBook>,
}

impl AlertStore {
    /// Create an empty alert store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an alert in the untriggered state.
    ///
    /// Duplicates of an existing identity are kept as independent alerts.
    /// Returns a snapshot of the stored alert.
    pub fn add(&self, alert: NewAlert) -> PriceAlert {
        let instrument = Instrument::new(alert.token.clone(), alert.network.clone());
        let stored = PriceAlert::pending(alert);

        self.book
            .lock()
            .by_instrument
            .entry(instrument)
            .or_default()
            .push(stored.clone());

        stored
    }

    /// Remove every alert whose identity matches `key` exactly.
    ///
    /// Returns the number of alerts removed; zero when nothing matched.
    pub fn remove(&self, key: &AlertKey) -> usize {
        self.remove_tracking(key).removed
    }

    /// Remove every alert matching `key` and report whether its token left
    /// the tracked set, both under one lock.
    pub fn remove_tracking(&self, key: &AlertKey) -> AlertRemoval {
        let mut book = self.book.lock();
        let Some(alerts) = book.by_instrument.get_mut(&key.instrument) else {
            return AlertRemoval::default();
        };

        let before = alerts.len();
        alerts.retain(|alert| !alert.has_identity(key));
        let removed = before - alerts.len();

        if !alerts.is_empty() {
            return AlertRemoval {
                removed,
                token_untracked: false,
            };
        }

        // Drop empty groups so they no longer count as tracked
        book.by_instrument.remove(&key.instrument);
        let token_untracked = !book
            .by_instrument
            .keys()
            .any(|instrument| instrument.token == key.instrument.token);

        AlertRemoval {
            removed,
            token_untracked,
        }
    }

    /// Remove all alerts. Returns the number of alerts removed.
    pub fn clear(&self) -> usize {
        let mut book = self.book.lock();
        let removed = book.len();
        book.by_instrument.clear();
        removed
    }

    /// Get the distinct instruments across all alerts, triggered or not.
    #[must_use]
    pub fn tracked_instruments(&self) -> BTreeSet<Instrument> {
        self.book.lock().by_instrument.keys().cloned().collect()
    }

    /// Get the distinct token identifiers across all alerts.
    #[must_use]
    pub fn tracked_tokens(&self) -> BTreeSet<String> {
        self.book
            .lock()
            .by_instrument
            .keys()
            .map(|instrument| instrument.token.clone())
            .collect()
    }

    /// Mark every pending alert satisfied by `tick` as triggered.
    ///
    /// Returns the alerts that fired on this call, in insertion order. The
    /// check and the mark happen under one lock, so an alert is reported at
    /// most once no matter how many ticks race for it.
    pub fn match_and_mark(&self, tick: &PriceTick) -> Vec<TriggeredAlert> {
        let mut book = self.book.lock();
        let Some(alerts) = book.by_instrument.get_mut(&tick.instrument) else {
            return Vec::new();
        };

        alerts
            .iter_mut()
            .filter(|alert| {
                !alert.triggered && alert.condition.is_satisfied_by(tick.price, alert.threshold)
            })
            .map(|alert| {
                alert.triggered = true;
                TriggeredAlert {
                    alert: alert.clone(),
                    tick: tick.clone(),
                }
            })
            .collect()
    }

    /// Count alerts with the given identity.
    #[must_use]
    pub fn count(&self, key: &AlertKey) -> usize {
        self.book
            .lock()
            .by_instrument
            .get(&key.instrument)
            .map_or(0, |alerts| {
                alerts.iter().filter(|alert| alert.has_identity(key)).count()
            })
    }

    /// Get the total number of alerts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.book.lock().len()
    }

    /// Check whether the store holds no alerts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.book.lock().by_instrument.is_empty()
    }

    /// Get a snapshot of all alerts, grouped by instrument.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PriceAlert> {
        self.book
            .lock()
            .by_instrument
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    /// Get statistics about the stored alerts.
    #[must_use]
    pub fn stats(&self) -> AlertStoreStats {
        let book = self.book.lock();
        let mut stats = AlertStoreStats {
            instruments: book.by_instrument.len(),
            ..AlertStoreStats::default()
        };

        for alert in book.by_instrument.values().flatten() {
            stats.total += 1;
            if alert.triggered {
                stats.triggered += 1;
            } else {
                stats.pending += 1;
            }
        }

        stats
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Alert store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertStoreStats {
    /// Total number of alerts.
    pub total: usize,
    /// Alerts still waiting for a crossing.
    pub pending: usize,
    /// Alerts that already fired.
    pub triggered: usize,
    /// Distinct instruments tracked.
    pub instruments: usize,
}

// =============================================================================
// Tests
// =============================================================================
