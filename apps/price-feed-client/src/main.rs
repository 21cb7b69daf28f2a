//! Price Feed Client Binary
//!
//! Connects to the price feed, seeds alerts from the environment, and logs
//! every price update, alert trigger, and connection change.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-feed-client
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `PRICE_FEED_URL`: Stream endpoint (`ws://` or `wss://`)
//! - `PRICE_FEED_API_KEY`: API key sent with subscribe requests
//!
//! ## Optional
//! - `PRICE_FEED_RECONNECT_BASE_DELAY_MS`: Backoff base (default: 1000)
//! - `PRICE_FEED_RECONNECT_MAX_DELAY_MS`: Backoff cap (default: 30000)
//! - `PRICE_FEED_RECONNECT_MULTIPLIER`: Backoff multiplier (default: 2.0)
//! - `PRICE_FEED_MAX_RECONNECT_ATTEMPTS`: Retries before giving up (default: 5)
//! - `PRICE_FEED_EVENT_CAPACITY`: Event channel capacity (default: 1024)
//! - `PRICE_FEED_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `PRICE_FEED_ALERTS`: Seed alerts, `token:network:above|below:threshold,...`
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: price-feed-client)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use price_feed_client::infrastructure::telemetry;
use price_feed_client::{
    ClientConfig, FeedConfig, FeedEvent, HealthServer, HealthServerState, PriceFeedClient,
    init_metrics,
};
use tokio::signal;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;

/// How long to wait for the stream's close handshake on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting price feed client");

    // Initialize Prometheus metrics
    let _metrics_handle =
        init_metrics().map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;

    let config = FeedConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let client = PriceFeedClient::new(ClientConfig::from_feed_config(&config));

    for alert in config.alerts.iter().cloned() {
        client.add_alert(alert);
    }

    // Spawn event logger before connecting so nothing is missed
    let events = BroadcastStream::new(client.events().events_rx());
    tokio::spawn(log_events(events, shutdown_token.clone()));

    if config.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            client.clone(),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    client.connect().context("failed to start price feed connection")?;

    tracing::info!("Price feed client ready");

    await_shutdown(shutdown_token).await;
    if tokio::time::timeout(SHUTDOWN_GRACE, client.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            grace_ms = SHUTDOWN_GRACE.as_millis(),
            "Price feed stream did not close in time"
        );
    }

    tracing::info!("Price feed client stopped");
    Ok(())
}

/// Log every client event until shutdown.
async fn log_events(mut events: BroadcastStream<FeedEvent>, shutdown: CancellationToken) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => return,
            event = events.next() => event,
        };

        match event {
            Some(Ok(FeedEvent::PriceUpdate(update))) => {
                tracing::debug!(
                    token = %update.token,
                    network = %update.network,
                    price = %update.price,
                    "Price update"
                );
            }
            Some(Ok(FeedEvent::AlertTriggered(alert))) => {
                tracing::info!(
                    token = %alert.token,
                    network = %alert.network,
                    condition = %alert.condition,
                    target_price = %alert.target_price,
                    current_price = %alert.current_price,
                    "ALERT"
                );
            }
            Some(Ok(FeedEvent::MaxReconnectAttemptsReached(event))) => {
                tracing::error!(
                    attempts = event.attempts,
                    "Price feed unavailable, giving up until restarted"
                );
            }
            Some(Ok(FeedEvent::StateChanged(transition))) => {
                tracing::info!(from = %transition.from, to = %transition.to, "Connection state");
            }
            Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                tracing::warn!(skipped, "Event logger lagged");
            }
            None => return,
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        url = %config.endpoint,
        health_port = config.server.health_port,
        max_reconnect_attempts = config.reconnect.max_attempts,
        seed_alerts = config.alerts.len(),
        "Configuration loaded"
    );
    tracing::debug!(
        base_delay_ms = config.reconnect.base_delay.as_millis(),
        max_delay_ms = config.reconnect.max_delay.as_millis(),
        multiplier = config.reconnect.multiplier,
        event_capacity = config.event_capacity,
        "Reconnect and channel settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
