//! Tick Processor
//!
//! Turns inbound feed frames into alert and price events. Frames that do not
//! decode into a `{token, network, price}` tick are logged and dropped
//! without touching the connection.

use std::sync::Arc;
use std::time::Instant;

use crate::domain::alert::AlertStore;
use crate::domain::streaming::{AlertTriggered, PriceTick, PriceUpdate};
use crate::infrastructure::broadcast::SharedEventHub;
use crate::infrastructure::feed::codec::JsonCodec;
use crate::infrastructure::metrics;

/// Longest frame prefix included in malformed-message logs.
const LOG_PREVIEW_CHARS: usize = 120;

/// Result of processing one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The frame was malformed and dropped; no events were published.
    Dropped,
    /// The tick was processed.
    Processed {
        /// Number of alerts that fired on this tick.
        triggered: usize,
    },
}

/// Evaluates ticks against the alert store and publishes the results.
///
/// For each valid tick, alert events are published before the tick's price
/// update, so a consumer of the ordered event stream sees cause before
/// effect.
#[derive(Debug, Clone)]
pub struct TickProcessor {
    codec: JsonCodec,
    alerts: Arc<AlertStore>,
    events: SharedEventHub,
}

impl TickProcessor {
    /// Create a new tick processor.
    #[must_use]
    pub const fn new(alerts: Arc<AlertStore>, events: SharedEventHub) -> Self {
        Self {
            codec: JsonCodec::new(),
            alerts,
            events,
        }
    }

    /// Decode and process a raw text frame from the feed.
    pub fn process_frame(&self, text: &str) -> TickOutcome {
        let started = Instant::now();

        let tick = match self.codec.decode_price_update(text) {
            Ok(tick) => tick,
            Err(e) => {
                let preview: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
                tracing::warn!(error = %e, payload = %preview, "Dropping malformed price feed message");
                metrics::record_message_dropped(e.kind());
                return TickOutcome::Dropped;
            }
        };

        metrics::record_tick_received();
        let outcome = self.process_tick(&tick);
        metrics::record_processing_duration(started.elapsed());

        outcome
    }

    /// Evaluate an already decoded tick.
    pub fn process_tick(&self, tick: &PriceTick) -> TickOutcome {
        let triggered = self.alerts.match_and_mark(tick);

        for fired in &triggered {
            tracing::info!(
                instrument = %tick.instrument,
                condition = %fired.alert.condition,
                target_price = %fired.alert.threshold,
                current_price = %tick.price,
                "Price alert triggered"
            );
            let _ = self
                .events
                .publish_alert_triggered(AlertTriggered::from(fired));
        }

        metrics::record_alerts_triggered(triggered.len());

        tracing::trace!(instrument = %tick.instrument, price = %tick.price, "Price update");
        let _ = self.events.publish_price_update(PriceUpdate::from(tick));

        TickOutcome::Processed {
            triggered: triggered.len(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
