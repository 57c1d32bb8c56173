//! MQTT 3.1.1 transport backed by rumqttc
//!
//! Pure pieces are kept apart from the I/O so they can be tested without a broker:
//!
//! - [`connection`] - Option building and packet id bookkeeping
//! - [`message_handler`] - Routing of raw rumqttc events
//! - [`client`] - The [`BrokerTransport`] that drives the event loop
//!
//! # Usage
//!
//! ```rust,no_run
//! use feedlink::config::ClientConfig;
//! use feedlink::transport::mqtt::BrokerTransport;
//! use feedlink::FeedClient;
//! use std::path::Path;
//!
//! # tokio_test::block_on(async {
//! let config = ClientConfig::load_from_file(Path::new("feedlink.toml"))?;
//! let transport = BrokerTransport::from_config(&config)?;
//!
//! let mut client = FeedClient::new(transport, &config.service.username);
//! client.connect().await?;
//! client.publish("temperature", "21.5").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{BrokerTransport, BrokerTransportError};
pub use connection::{configure_mqtt_options, PacketKind, PacketTracker};
pub use message_handler::{EventRoute, MessageHandler};
