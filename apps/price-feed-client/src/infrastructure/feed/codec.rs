//! Price Feed Codec
//!
//! JSON encoding and decoding for the price feed stream.
//!
//! Inbound frames are single JSON objects. Anything that is not an object
//! with string `token`, string `network`, and numeric `price` is rejected
//! with a `CodecError` naming what was wrong, so the caller can log it and
//! drop the frame. So is a price too large for `Decimal`.

use super::messages::{PriceUpdateMessage, SubscribeRequest};
use crate::domain::streaming::PriceTick;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has the wrong JSON type.
    #[error("field {0} has the wrong type")]
    InvalidField(&'static str),

    /// A numeric field cannot be represented.
    #[error("field {field} out of range: {reason}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Conversion failure.
        reason: String,
    },

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

impl CodecError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "invalid_json",
            Self::MissingField(_) => "missing_field",
            Self::InvalidField(_) => "invalid_field",
            Self::OutOfRange { .. } => "out_of_range",
            Self::InvalidFormat(_) => "invalid_format",
        }
    }
}

/// JSON codec for the price feed stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame into a price tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not valid JSON, is not an object,
    /// or lacks a correctly typed `token`, `network`, or `price` field.
    pub fn decode_price_update(&self, text: &str) -> Result<PriceTick, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text.trim())?;

        let Some(object) = value.as_object() else {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got {}",
                json_type_name(&value)
            )));
        };

        require_field(object, "token", serde_json::Value::is_string)?;
        require_field(object, "network", serde_json::Value::is_string)?;
        require_field(object, "price", serde_json::Value::is_number)?;

        // Field types are checked above; only the price conversion can fail
        let message: PriceUpdateMessage =
            serde_json::from_value(value).map_err(|e| CodecError::OutOfRange {
                field: "price",
                reason: e.to_string(),
            })?;
        Ok(message.into())
    }

    /// Encode a subscribe request.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_subscribe(&self, request: &SubscribeRequest) -> Result<String, CodecError> {
        Ok(serde_json::to_string(request)?)
    }
}

fn require_field(
    object: &serde_json::Map<String, serde_json::Value>,
    field: &'static str,
    has_expected_type: fn(&serde_json::Value) -> bool,
) -> Result<(), CodecError> {
    match object.get(field) {
        None | Some(serde_json::Value::Null) => Err(CodecError::MissingField(field)),
        Some(value) if !has_expected_type(value) => Err(CodecError::InvalidField(field)),
        Some(_) => Ok(()),
    }
}

const fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rust_decimal::Decimal;
    use test_case::test_case;

    use super::*;

    #[test]
    fn decode_valid_update() {
        let codec = JsonCodec::new();
        let tick = codec
            .decode_price_update(r#"{"token":"ETH","network":"ethereum","price":3521.17}"#)
            .unwrap();

        assert_eq!(tick.instrument.token, "ETH");
        assert_eq!(tick.instrument.network, "ethereum");
        assert_eq!(tick.price, Decimal::new(352_117, 2));
    }

    #[test]
    fn decode_integer_price() {
        let tick = JsonCodec::new()
            .decode_price_update(r#"{"token":"BTC","network":"bitcoin","price":64000}"#)
            .unwrap();
        assert_eq!(tick.price, Decimal::from(64_000));
    }

    #[test]
    fn decode_ignores_extra_fields() {
        let tick = JsonCodec::new()
            .decode_price_update(
                r#"{"token":"ETH","network":"ethereum","price":1.5,"volume":10}"#,
            )
            .unwrap();
        assert_eq!(tick.price, Decimal::new(15, 1));
    }

    #[test_case(r#"{"token":"ETH","network":"ethereum"}"#, "missing_field" ; "missing price")]
    #[test_case(r#"{"network":"ethereum","price":1}"#, "missing_field" ; "missing token")]
    #[test_case(r#"{"token":"ETH","network":"ethereum","price":null}"#, "missing_field" ; "null price")]
    #[test_case(r#"{"token":"ETH","network":"ethereum","price":"1.5"}"#, "invalid_field" ; "string price")]
    #[test_case(r#"{"token":7,"network":"ethereum","price":1}"#, "invalid_field" ; "numeric token")]
    #[test_case(r#"[{"token":"ETH","network":"ethereum","price":1}]"#, "invalid_format" ; "array payload")]
    #[test_case(r#"{"token":"ETH","network":"ethereum","price":1e30}"#, "out_of_range" ; "price beyond decimal range")]
    #[test_case("not json at all", "invalid_json" ; "garbage")]
    fn decode_rejects_malformed(payload: &str, kind: &str) {
        let err = JsonCodec::new().decode_price_update(payload).unwrap_err();
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn encode_subscribe_request() {
        let tokens: BTreeSet<String> = ["SOL".to_string()].into_iter().collect();
        let json = JsonCodec::new()
            .encode_subscribe(&SubscribeRequest::new("abc", tokens))
            .unwrap();

        assert_eq!(json, r#"{"type":"subscribe","apiKey":"abc","tokens":["SOL"]}"#);
    }
}
