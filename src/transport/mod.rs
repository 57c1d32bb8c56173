//! Transport layer for the feed client
//!
//! The client never touches sockets itself. It drives a [`Transport`], which owns the
//! network session, handshake, keep-alive and framing, and reports what happened
//! through [`TransportEvent`]s returned from [`Transport::poll`].

use bytes::Bytes;
use std::time::Duration;

pub mod mqtt;

/// Connection acknowledgement returned by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    /// CONNACK return code; zero means accepted
    pub code: u8,
}

impl ConnAck {
    pub const ACCEPTED: ConnAck = ConnAck { code: 0 };

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Events surfaced by the transport while polling
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection acknowledgement, e.g. after the transport re-established a session
    ConnAck(ConnAck),
    /// Session closed by the broker or the network
    Disconnected,
    /// Inbound publish on a subscribed topic
    Message { topic: String, payload: Bytes },
    /// Subscription acknowledged
    SubAck {
        topic: String,
        packet_id: u16,
        granted_qos: u8,
    },
    /// Unsubscription acknowledged
    UnsubAck { topic: String, packet_id: u16 },
    /// Publish acknowledged
    PubAck { topic: String, packet_id: u16 },
}

/// Transport trait for the feed client
///
/// This trait provides an abstraction over the MQTT session so the client can be
/// driven by a real broker connection or by a scripted mock in tests.
#[async_trait::async_trait]
pub trait Transport: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open the session and wait for the broker's acknowledgement
    async fn connect(&mut self) -> Result<ConnAck, Self::Error>;

    /// Re-establish a dropped session
    async fn reconnect(&mut self) -> Result<ConnAck, Self::Error>;

    /// Close the session
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Check the session; an `Err` means the transport could not tell
    fn is_connected(&self) -> Result<bool, Self::Error>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<(), Self::Error>;

    /// Wait up to `timeout` for the next event; `None` when nothing arrived
    async fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, Self::Error>;
}
