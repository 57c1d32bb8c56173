//! Feedlink - device-side client for a feed telemetry service
//!
//! Devices exchange named time-series values ("feeds") and feed collections ("groups")
//! with the service over MQTT. This crate provides:
//! - The topic grammar and feed key validation
//! - A publish/subscribe client with a callback-based event contract
//! - Throttle, group fan-out, server time and per-feed routing on the inbound side
//! - A rumqttc-backed transport and a scriptable mock transport
//!
//! # Quick Start
//!
//! ```rust
//! use feedlink::protocol::{parse_inbound, Inbound, TimeUnit, TopicBuilder};
//!
//! let topic = TopicBuilder::feed("alice", "temperature");
//! assert_eq!(topic, "alice/feeds/temperature");
//! assert_eq!(
//!     parse_inbound(&topic),
//!     Inbound::FeedMessage { feed_key: "temperature".to_string() }
//! );
//! assert_eq!(TopicBuilder::time(TimeUnit::Iso), "time/ISO-8601");
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use client::{Ack, ConnectionState, EventKind, FeedClient, PublishOptions, Session, Target};
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, ClientResult, MqttError};
pub use protocol::{validate_feed_key, FeedKeyError, TimeUnit};
pub use transport::mqtt::BrokerTransport;
pub use transport::{ConnAck, Transport, TransportEvent};
