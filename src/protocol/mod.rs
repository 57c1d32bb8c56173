//! Wire-level grammar of the telemetry service
//!
//! Topics are the only addressing unit; payloads are plain text except for
//! group fan-out messages.

pub mod messages;
pub mod topics;

pub use messages::{format_csv_payload, value_text, GroupPayload, RETAINED_REQUEST_PAYLOAD};
pub use topics::{
    parse_inbound, validate_feed_key, FeedKeyError, Inbound, SystemTopic, TimeUnit, TopicBuilder,
    MAX_FEED_KEY_LEN,
};
