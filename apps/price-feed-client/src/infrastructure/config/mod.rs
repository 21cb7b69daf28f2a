//! Configuration Module
//!
//! Configuration loading for the price feed client.

mod settings;

pub use settings::{
    ApiKey, ConfigError, FeedConfig, ReconnectSettings, ServerSettings, parse_alert_list,
};
