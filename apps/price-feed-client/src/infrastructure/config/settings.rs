//! Client Configuration Settings
//!
//! Configuration types for the price feed client, loaded from environment
//! variables.

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::alert::{AlertCondition, NewAlert};

/// Price feed API key.
///
/// Opaque to the client; only the upstream feed validates it.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap an API key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Get the raw key for the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Reconnect backoff settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Base delay; retry `n` waits `base_delay * multiplier^n`.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Retries before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Stream endpoint URL.
    pub endpoint: String,
    /// API key sent with every subscribe request.
    pub api_key: ApiKey,
    /// Reconnect backoff settings.
    pub reconnect: ReconnectSettings,
    /// Capacity of each event channel.
    pub event_capacity: usize,
    /// Server port settings.
    pub server: ServerSettings,
    /// Alerts to seed the store with at startup.
    pub alerts: Vec<NewAlert>,
}

/// Default capacity for event channels.
const DEFAULT_EVENT_CAPACITY: usize = 1_024;

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// the seed alert list cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required values are missing or empty, or the
    /// seed alert list cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = required(&lookup, "PRICE_FEED_URL")?;
        let api_key = required(&lookup, "PRICE_FEED_API_KEY")?;

        let defaults = ReconnectSettings::default();
        let reconnect = ReconnectSettings {
            base_delay: parse_duration_millis(
                &lookup,
                "PRICE_FEED_RECONNECT_BASE_DELAY_MS",
                defaults.base_delay,
            ),
            max_delay: parse_duration_millis(
                &lookup,
                "PRICE_FEED_RECONNECT_MAX_DELAY_MS",
                defaults.max_delay,
            ),
            multiplier: parse_or(
                &lookup,
                "PRICE_FEED_RECONNECT_MULTIPLIER",
                defaults.multiplier,
            ),
            max_attempts: parse_or(
                &lookup,
                "PRICE_FEED_MAX_RECONNECT_ATTEMPTS",
                defaults.max_attempts,
            ),
        };

        let server = ServerSettings {
            health_port: parse_or(
                &lookup,
                "PRICE_FEED_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let alerts = match lookup("PRICE_FEED_ALERTS") {
            Some(raw) => parse_alert_list(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            endpoint,
            api_key: ApiKey::new(api_key),
            reconnect,
            event_capacity: parse_or(&lookup, "PRICE_FEED_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY),
            server,
            alerts,
        })
    }
}

/// Parse a comma-separated list of `token:network:above|below:threshold`.
///
/// Blank entries are skipped.
///
/// # Errors
///
/// Returns `ConfigError::InvalidAlert` for the first entry that does not
/// parse.
pub fn parse_alert_list(raw: &str) -> Result<Vec<NewAlert>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_alert)
        .collect()
}

fn parse_alert(entry: &str) -> Result<NewAlert, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidAlert {
        entry: entry.to_string(),
        reason,
    };

    let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
    let [token, network, condition, threshold] = parts.as_slice() else {
        return Err(invalid(format!(
            "expected 4 fields separated by ':', got {}",
            parts.len()
        )));
    };

    if token.is_empty() || network.is_empty() {
        return Err(invalid("token and network cannot be empty".to_string()));
    }

    let condition = AlertCondition::from_str(condition).map_err(|e| invalid(e.to_string()))?;
    let threshold = Decimal::from_str(threshold)
        .map_err(|e| invalid(format!("bad threshold {threshold:?}: {e}")))?;

    Ok(NewAlert::new(*token, *network, condition, threshold))
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// A seed alert entry could not be parsed.
    #[error("invalid alert {entry:?}: {reason}")]
    InvalidAlert {
        /// The offending entry.
        entry: String,
        /// Why it was rejected.
        reason: String,
    },
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
