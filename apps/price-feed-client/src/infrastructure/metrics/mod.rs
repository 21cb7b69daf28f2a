//! Prometheus Metrics Module
//!
//! Exposes client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: Price messages received and dropped
//! - **Alerts**: Triggers and the number of active alerts
//! - **Connection**: Current state, attempts, and scheduled reconnects
//! - **Latency**: Per-tick processing time
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before `init_metrics` is a no-op, so library users that do not install a
//! recorder pay nothing.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Tick counters
    describe_counter!(
        "price_feed_ticks_received_total",
        "Total valid price ticks received from the feed"
    );
    describe_counter!(
        "price_feed_messages_dropped_total",
        "Total inbound messages dropped as malformed, by reason"
    );

    // Alerts
    describe_counter!(
        "price_feed_alerts_triggered_total",
        "Total price alerts triggered"
    );
    describe_gauge!("price_feed_active_alerts", "Number of alerts in the store");

    // Connection
    describe_gauge!(
        "price_feed_connection_state",
        "Current connection state (0=idle, 1=connecting, 2=open, 3=closed, 4=failed)"
    );
    describe_counter!(
        "price_feed_connection_attempts_total",
        "Total connection attempts, including the initial one"
    );
    describe_counter!(
        "price_feed_reconnects_total",
        "Total reconnects scheduled after a connection loss"
    );
    describe_counter!(
        "price_feed_reconnects_exhausted_total",
        "Times the reconnect policy gave up"
    );
    describe_counter!(
        "price_feed_subscriptions_sent_total",
        "Total subscribe requests written to the feed"
    );

    // Latency histograms
    describe_histogram!(
        "price_feed_tick_processing_seconds",
        "Time to decode a tick, match alerts, and publish events"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const fn state_value(state: ConnectionState) -> f64 {
    match state {
        ConnectionState::Idle => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Open => 2.0,
        ConnectionState::Closed => 3.0,
        ConnectionState::Failed => 4.0,
    }
}

/// Record a valid tick.
pub fn record_tick_received() {
    counter!("price_feed_ticks_received_total").increment(1);
}

/// Record a dropped inbound message.
pub fn record_message_dropped(reason: &'static str) {
    counter!("price_feed_messages_dropped_total", "reason" => reason).increment(1);
}

/// Record alerts fired by a single tick.
pub fn record_alerts_triggered(count: usize) {
    if count > 0 {
        counter!("price_feed_alerts_triggered_total").increment(count as u64);
    }
}

/// Update the active alert gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_alerts(count: usize) {
    gauge!("price_feed_active_alerts").set(count as f64);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("price_feed_connection_state").set(state_value(state));
}

/// Record a connection attempt.
pub fn record_connection_attempt() {
    counter!("price_feed_connection_attempts_total").increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect_scheduled() {
    counter!("price_feed_reconnects_total").increment(1);
}

/// Record that the reconnect policy gave up.
pub fn record_reconnects_exhausted() {
    counter!("price_feed_reconnects_exhausted_total").increment(1);
}

/// Record a subscribe request written to the feed.
pub fn record_subscription_sent() {
    counter!("price_feed_subscriptions_sent_total").increment(1);
}

/// Record tick processing duration.
pub fn record_processing_duration(duration: Duration) {
    histogram!("price_feed_tick_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_gauge_values_are_distinct() {
        let values = [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::Open,
            ConnectionState::Closed,
            ConnectionState::Failed,
        ]
        .map(state_value);

        assert_eq!(values, [0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_tick_received();
        record_message_dropped("missing_field");
        record_alerts_triggered(3);
        set_connection_state(ConnectionState::Open);
        record_processing_duration(Duration::from_micros(5));
    }
}
