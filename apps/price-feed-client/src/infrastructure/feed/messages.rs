//! Price Feed Wire Message Types
//!
//! Wire format types for the price feed WebSocket stream.
//!
//! # Message Types
//!
//! ## Outbound
//! - `SubscribeRequest`: Full set of tokens the client wants prices for
//!
//! ## Inbound
//! - `PriceUpdateMessage`: One price observation

use std::collections::BTreeSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::alert::Instrument;
use crate::domain::streaming::PriceTick;

/// Subscribe request sent on every open and on every resubscribe.
///
/// The token list always carries the complete tracked set; the feed is
/// expected to replace any previous subscription with it.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "subscribe", "apiKey": "<key>", "tokens": ["BTC", "ETH"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    /// Message type (always "subscribe").
    #[serde(rename = "type")]
    pub msg_type: String,
    /// API key for the feed.
    pub api_key: String,
    /// Distinct token identifiers, sorted.
    pub tokens: Vec<String>,
}

impl SubscribeRequest {
    /// Create a subscribe request for the given tokens.
    #[must_use]
    pub fn new(api_key: impl Into<String>, tokens: BTreeSet<String>) -> Self {
        Self {
            msg_type: "subscribe".to_string(),
            api_key: api_key.into(),
            tokens: tokens.into_iter().collect(),
        }
    }
}

/// Inbound price update.
///
/// # Wire Format (JSON)
/// ```json
/// {"token": "ETH", "network": "ethereum", "price": 3521.17}
/// ```
///
/// `price` must be a JSON number; string-encoded prices are rejected.
/// Numbers beyond the range of `Decimal` (about 7.9e28) fail to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdateMessage {
    /// Token identifier.
    pub token: String,
    /// Network identifier.
    pub network: String,
    /// Price as a JSON number.
    #[serde(
        serialize_with = "rust_decimal::serde::float::serialize",
        deserialize_with = "deserialize_number_price"
    )]
    pub price: Decimal,
}

/// Accept only a JSON number, converting it through its shortest decimal
/// text so `49.999999` stays exact.
fn deserialize_number_price<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;

    if let Some(int) = number.as_i64() {
        return Ok(Decimal::from(int));
    }
    if let Some(uint) = number.as_u64() {
        return Ok(Decimal::from(uint));
    }

    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| serde::de::Error::custom(format!("price {text} out of range: {e}")))
}

impl From<PriceUpdateMessage> for PriceTick {
    fn from(msg: PriceUpdateMessage) -> Self {
        Self::new(Instrument::new(msg.token, msg.network), msg.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_request_wire_format() {
        let tokens: BTreeSet<String> = ["ETH", "BTC"].into_iter().map(String::from).collect();
        let request = SubscribeRequest::new("key-123", tokens);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "subscribe");
        assert_eq!(json["apiKey"], "key-123");
        assert_eq!(json["tokens"], serde_json::json!(["BTC", "ETH"]));
    }

    #[test]
    fn empty_subscribe_request_has_empty_token_list() {
        let request = SubscribeRequest::new("key", BTreeSet::new());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tokens"], serde_json::json!([]));
    }

    #[test]
    fn price_update_parses_number() {
        let msg: PriceUpdateMessage =
            serde_json::from_str(r#"{"token":"ETH","network":"ethereum","price":49.999999}"#)
                .unwrap();
        assert_eq!(msg.price, Decimal::new(49_999_999, 6));
    }

    #[test]
    fn price_update_parses_exponent() {
        let msg: PriceUpdateMessage =
            serde_json::from_str(r#"{"token":"ETH","network":"ethereum","price":1e-7}"#).unwrap();
        assert_eq!(msg.price, Decimal::new(1, 7));
    }

    #[test]
    fn price_update_rejects_out_of_range_price() {
        let result: Result<PriceUpdateMessage, _> =
            serde_json::from_str(r#"{"token":"ETH","network":"ethereum","price":1e30}"#);
        assert!(result.is_err());
    }

    #[test]
    fn price_update_rejects_string_price() {
        let result: Result<PriceUpdateMessage, _> =
            serde_json::from_str(r#"{"token":"ETH","network":"ethereum","price":"100"}"#);
        assert!(result.is_err());
    }
}
