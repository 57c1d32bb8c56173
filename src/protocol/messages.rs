//! Payload formats exchanged with the telemetry service
//!
//! Outbound payloads are plain text (the stringified value, or a CSV line carrying
//! location metadata). The only structured inbound payload is the group fan-out object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payload sent to a feed's `/get` topic to request its retained value
pub const RETAINED_REQUEST_PAYLOAD: &str = "\0";

/// Inbound group message: `{"feeds": {feed_name: value, ...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPayload {
    pub feeds: Map<String, Value>,
}

impl GroupPayload {
    /// Decode a raw group payload
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Flatten into `(feed_name, value)` pairs in payload key order.
    ///
    /// String values are returned without quotes; other values use their compact JSON text.
    pub fn into_values(self) -> Vec<(String, String)> {
        self.feeds
            .into_iter()
            .map(|(name, value)| (name, value_text(&value)))
            .collect()
    }
}

/// Render a JSON value the way it would have been published as plain text
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Format a value plus `lat,lon,ele` metadata as a CSV publish payload
pub fn format_csv_payload(value: &str, metadata: &str) -> String {
    format!("{value},{metadata}")
}
