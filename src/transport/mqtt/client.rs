//! Impure I/O operations for the broker transport
//!
//! This module owns the rumqttc client and event loop. The event loop is only driven
//! from inside transport calls, so nothing happens on the network between calls.

use super::connection::{configure_mqtt_options, PacketKind, PacketTracker};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::{ClientConfig, ConfigError};
use crate::transport::{ConnAck, Transport, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, ConnectionError, EventLoop, MqttOptions, QoS};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Request queue depth between the client handle and the event loop
const REQUEST_CAPACITY: usize = 10;

/// Broker transport errors
#[derive(Debug, Error)]
pub enum BrokerTransportError {
    #[error("MQTT client request failed")]
    Client(#[from] rumqttc::ClientError),
    #[error("MQTT connection error")]
    Connection(#[from] ConnectionError),
    #[error("No CONNACK within {0:?}")]
    ConnectTimeout(Duration),
    #[error("Request was not written within {0:?}")]
    WriteTimeout(Duration),
    #[error("Invalid transport configuration")]
    Config(#[from] ConfigError),
}

/// Outcome of driving the event loop once
enum Step {
    Event(TransportEvent),
    Sent,
    DisconnectSent,
    Idle,
    TimedOut,
}

/// rumqttc-backed MQTT 3.1.1 session
pub struct BrokerTransport {
    options: MqttOptions,
    client: AsyncClient,
    event_loop: EventLoop,
    connect_timeout: Duration,
    connected: bool,
    tracker: PacketTracker,
    backlog: VecDeque<TransportEvent>,
}

impl BrokerTransport {
    pub fn new(options: MqttOptions, connect_timeout: Duration) -> Self {
        let (client, event_loop) = AsyncClient::new(options.clone(), REQUEST_CAPACITY);
        Self {
            options,
            client,
            event_loop,
            connect_timeout,
            connected: false,
            tracker: PacketTracker::new(),
            backlog: VecDeque::new(),
        }
    }

    /// Build a transport for the configured broker, reading the service key from the environment
    pub fn from_config(config: &ClientConfig) -> Result<Self, BrokerTransportError> {
        let key = config.service_key()?;
        let options = configure_mqtt_options(config, &key)?;
        Ok(Self::new(options, config.connect_timeout()))
    }

    /// Drive the event loop until CONNACK arrives
    async fn await_connack(&mut self) -> Result<ConnAck, BrokerTransportError> {
        let deadline = Instant::now() + self.connect_timeout;
        loop {
            match self.step(deadline).await {
                Ok(Step::Event(TransportEvent::ConnAck(ack))) => return Ok(ack),
                Ok(Step::Event(event)) => self.backlog.push_back(event),
                Ok(Step::TimedOut) => {
                    return Err(BrokerTransportError::ConnectTimeout(self.connect_timeout))
                }
                Ok(_) => continue,
                // rumqttc reports a refused CONNACK as an error; surface it as a code
                Err(BrokerTransportError::Connection(ConnectionError::ConnectionRefused(code))) => {
                    return Ok(ConnAck { code: code as u8 })
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Drive the event loop until the oldest queued request of `kind` has been written.
    ///
    /// Events that arrive meanwhile are kept for the next `poll`.
    async fn flush(&mut self, kind: PacketKind) -> Result<(), BrokerTransportError> {
        let deadline = Instant::now() + self.connect_timeout;
        let target = self.tracker.pending(kind).saturating_sub(1);
        while self.tracker.pending(kind) > target {
            match self.step(deadline).await? {
                Step::Event(event) => self.backlog.push_back(event),
                Step::TimedOut => {
                    return Err(BrokerTransportError::WriteTimeout(self.connect_timeout))
                }
                Step::Sent | Step::DisconnectSent | Step::Idle => {}
            }
        }
        Ok(())
    }

    /// Poll the event loop once, bounded by `deadline`
    async fn step(&mut self, deadline: Instant) -> Result<Step, BrokerTransportError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = match tokio::time::timeout(remaining, self.event_loop.poll()).await {
            Err(_) => return Ok(Step::TimedOut),
            Ok(Err(e)) => {
                self.connected = false;
                return Err(e.into());
            }
            Ok(Ok(event)) => event,
        };

        let step = match MessageHandler::route_mqtt_event(&event) {
            EventRoute::ConnectionAcknowledged { code } => {
                self.connected = code == 0;
                Step::Event(TransportEvent::ConnAck(ConnAck { code }))
            }
            EventRoute::MessageReceived { topic, payload } => {
                debug!(target: "mqtt_transport", "Received MQTT message on topic: {}", topic);
                Step::Event(TransportEvent::Message { topic, payload })
            }
            EventRoute::Disconnected => {
                self.connected = false;
                Step::Event(TransportEvent::Disconnected)
            }
            EventRoute::Acknowledged {
                kind,
                packet_id,
                granted_qos,
            } => {
                let topic = self
                    .tracker
                    .acknowledge(kind, packet_id)
                    .unwrap_or_default();
                Step::Event(match kind {
                    PacketKind::Subscribe => TransportEvent::SubAck {
                        topic,
                        packet_id,
                        granted_qos,
                    },
                    PacketKind::Unsubscribe => TransportEvent::UnsubAck { topic, packet_id },
                    PacketKind::Publish => TransportEvent::PubAck { topic, packet_id },
                })
            }
            EventRoute::Sent { kind, packet_id } => {
                self.tracker.sent(kind, packet_id);
                Step::Sent
            }
            EventRoute::DisconnectSent => Step::DisconnectSent,
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                Step::Idle
            }
            EventRoute::OutgoingEvent => Step::Idle,
        };
        Ok(step)
    }
}

#[async_trait]
impl Transport for BrokerTransport {
    type Error = BrokerTransportError;

    async fn connect(&mut self) -> Result<ConnAck, Self::Error> {
        let (host, port) = self.options.broker_address();
        info!("Connecting to MQTT broker {}:{}", host, port);
        self.await_connack().await
    }

    async fn reconnect(&mut self) -> Result<ConnAck, Self::Error> {
        // Replace the session so nothing from the broken one is replayed
        let (client, event_loop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        self.client = client;
        self.event_loop = event_loop;
        self.connected = false;
        self.tracker.clear();
        info!("Created new connection for reconnection attempt");
        self.await_connack().await
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.client.disconnect().await?;

        let deadline = Instant::now() + self.connect_timeout;
        loop {
            match self.step(deadline).await {
                Ok(Step::DisconnectSent) | Ok(Step::TimedOut) => break,
                Ok(Step::Event(event)) => self.backlog.push_back(event),
                Ok(_) => continue,
                Err(e) => {
                    // The session is gone either way
                    warn!("MQTT error while disconnecting: {}", e);
                    break;
                }
            }
        }

        self.connected = false;
        info!("MQTT client disconnected");
        Ok(())
    }

    fn is_connected(&self) -> Result<bool, Self::Error> {
        Ok(self.connected)
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        self.tracker.queue(PacketKind::Subscribe, topic);
        self.flush(PacketKind::Subscribe).await
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.client.unsubscribe(topic).await?;
        self.tracker.queue(PacketKind::Unsubscribe, topic);
        self.flush(PacketKind::Unsubscribe).await
    }

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<(), Self::Error> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await?;
        self.tracker.queue(PacketKind::Publish, topic);
        self.flush(PacketKind::Publish).await
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<TransportEvent>, Self::Error> {
        if let Some(event) = self.backlog.pop_front() {
            return Ok(Some(event));
        }

        let deadline = Instant::now() + timeout;
        loop {
            match self.step(deadline).await? {
                Step::Event(event) => return Ok(Some(event)),
                Step::TimedOut => return Ok(None),
                Step::Sent | Step::DisconnectSent | Step::Idle => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_options() -> MqttOptions {
        // Port 1 on localhost refuses connections immediately
        MqttOptions::new("feedlink-test", "127.0.0.1", 1)
    }

    #[tokio::test]
    async fn test_new_transport_is_not_connected() {
        let transport = BrokerTransport::new(unreachable_options(), Duration::from_millis(100));
        assert!(!transport.is_connected().unwrap());
    }

    #[tokio::test]
    async fn test_from_config_requires_service_key() {
        let mut config = ClientConfig::test_config();
        config.service.key_env = "FEEDLINK_KEY_THAT_IS_NOT_SET".to_string();

        let result = BrokerTransport::from_config(&config);
        assert!(matches!(
            result,
            Err(BrokerTransportError::Config(ConfigError::EnvVarNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_broker_fails() {
        let mut transport =
            BrokerTransport::new(unreachable_options(), Duration::from_millis(500));

        let result = transport.connect().await;
        assert!(result.is_err(), "connecting to a closed port should fail");
        assert!(!transport.is_connected().unwrap());
    }

    #[tokio::test]
    async fn test_poll_drains_backlog_first() {
        let mut transport = BrokerTransport::new(unreachable_options(), Duration::from_millis(50));
        transport.backlog.push_back(TransportEvent::Disconnected);

        // Buffered events are returned before the network is touched
        let event = transport.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(event, Some(TransportEvent::Disconnected));
    }
}
