//! Pure connection configuration and packet bookkeeping for the broker transport
//!
//! This module contains pure functions for building rumqttc options from
//! configuration and for correlating packet ids with the topics they were sent to.

use crate::config::{parse_broker_url, ClientConfig, ConfigError};
use rumqttc::{MqttOptions, Transport as RumqttcTransport};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Shortest keep-alive interval negotiated with the broker
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Build MQTT options for the configured broker and account
pub fn configure_mqtt_options(config: &ClientConfig, key: &str) -> Result<MqttOptions, ConfigError> {
    let endpoint = parse_broker_url(&config.mqtt.broker_url)?;

    let client_id = format!("feedlink-{}", uuid::Uuid::new_v4().simple());
    let mut mqtt_options = MqttOptions::new(client_id, endpoint.host, endpoint.port);

    if endpoint.tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    // The service authenticates with the account name and its key
    mqtt_options.set_credentials(config.service.username.clone(), key.to_string());
    mqtt_options.set_keep_alive(config.keep_alive().max(MIN_KEEP_ALIVE));
    mqtt_options.set_clean_session(true);

    Ok(mqtt_options)
}

/// Packet types whose acknowledgements are correlated with a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Subscribe,
    Unsubscribe,
    Publish,
}

/// Correlates outgoing packet ids with the topics passed to the transport.
///
/// rumqttc assigns packet ids when it writes a request, in request order, so topics
/// are queued on request and bound to an id when the outgoing event is observed.
#[derive(Debug, Default)]
pub struct PacketTracker {
    queued: HashMap<PacketKind, VecDeque<String>>,
    in_flight: HashMap<(PacketKind, u16), String>,
}

impl PacketTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request that has been handed to the client but not yet written
    pub fn queue(&mut self, kind: PacketKind, topic: &str) {
        self.queued
            .entry(kind)
            .or_default()
            .push_back(topic.to_string());
    }

    /// Bind the oldest queued topic of `kind` to the packet id rumqttc wrote
    pub fn sent(&mut self, kind: PacketKind, packet_id: u16) {
        if let Some(topic) = self.queued.get_mut(&kind).and_then(VecDeque::pop_front) {
            // QoS 0 writes report id 0 and are never acknowledged
            if packet_id != 0 {
                self.in_flight.insert((kind, packet_id), topic);
            }
        }
    }

    /// Resolve an acknowledgement to its topic
    pub fn acknowledge(&mut self, kind: PacketKind, packet_id: u16) -> Option<String> {
        self.in_flight.remove(&(kind, packet_id))
    }

    pub fn pending(&self, kind: PacketKind) -> usize {
        self.queued.get(&kind).map_or(0, VecDeque::len)
    }

    /// Forget everything, e.g. when the session is replaced
    pub fn clear(&mut self) {
        self.queued.clear();
        self.in_flight.clear();
    }
}
