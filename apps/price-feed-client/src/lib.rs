#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Feed Client - Streaming Prices and Price Alerts
//!
//! Maintains a single streaming connection to a market data feed, recovers
//! from failures with capped exponential backoff, and evaluates every price
//! tick against user-defined alerts.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Alert store and streaming types
//!   - `alert`: Alerts, identities, and the lock-guarded store
//!   - `streaming`: Ticks, connection states, and events
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for the feed transport
//!   - `services`: Tick processing
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Codec, reconnect policy, WebSocket transport, client
//!   - `broadcast`: Typed event channels
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//!                 ┌─────────────┐     ┌───────────┐     ┌────────────┐
//! Price feed WS ─►│ Feed client │────►│   Tick    │────►│ Event hub  │──► Subscribers
//!                 └─────────────┘     │ processor │     └────────────┘
//!                        ▲            └─────┬─────┘
//!            resubscribe │                  │ match_and_mark
//!                 ┌──────┴──────┐           │
//!   add/remove ──►│ Alert store │◄──────────┘
//!                 └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Alert and streaming types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::alert::{
    AlertCondition, AlertKey, AlertRemoval, AlertStore, AlertStoreStats, Instrument, NewAlert,
    PriceAlert, TriggeredAlert,
};
pub use domain::streaming::{
    AlertTriggered, ConnectionState, FeedEvent, MaxReconnectAttemptsReached, PriceTick,
    PriceUpdate, StateTransition,
};

// Ports
pub use application::ports::{FeedConnection, FeedConnector, TransportError};

// Client
pub use infrastructure::feed::{
    ClientConfig, ClientError, PriceFeedClient, ReconnectConfig, ReconnectPolicy,
};

// Infrastructure config
pub use infrastructure::config::{ApiKey, ConfigError, FeedConfig, ReconnectSettings, ServerSettings};

// Event hub
pub use infrastructure::broadcast::{EventHub, EventHubConfig, EventHubStats, SharedEventHub};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
