//! Pure routing of rumqttc events
//!
//! Maps raw event loop output to a small routing decision the broker transport acts on.

use super::connection::PacketKind;
use bytes::Bytes;
use rumqttc::{Event, Outgoing, Packet, SubscribeReasonCode};

/// Granted QoS reported for a rejected subscription
pub const SUBSCRIBE_FAILURE: u8 = 0x80;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    code: connack.code as u8,
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                },
                Packet::Disconnect => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::Acknowledged {
                    kind: PacketKind::Subscribe,
                    packet_id: suback.pkid,
                    granted_qos: suback
                        .return_codes
                        .first()
                        .map_or(SUBSCRIBE_FAILURE, Self::granted_qos),
                },
                Packet::UnsubAck(unsuback) => EventRoute::Acknowledged {
                    kind: PacketKind::Unsubscribe,
                    packet_id: unsuback.pkid,
                    granted_qos: 0,
                },
                Packet::PubAck(puback) => EventRoute::Acknowledged {
                    kind: PacketKind::Publish,
                    packet_id: puback.pkid,
                    granted_qos: 0,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(outgoing) => match outgoing {
                Outgoing::Subscribe(pkid) => EventRoute::Sent {
                    kind: PacketKind::Subscribe,
                    packet_id: *pkid,
                },
                Outgoing::Unsubscribe(pkid) => EventRoute::Sent {
                    kind: PacketKind::Unsubscribe,
                    packet_id: *pkid,
                },
                Outgoing::Publish(pkid) => EventRoute::Sent {
                    kind: PacketKind::Publish,
                    packet_id: *pkid,
                },
                Outgoing::Disconnect => EventRoute::DisconnectSent,
                _ => EventRoute::OutgoingEvent,
            },
        }
    }

    /// Granted QoS byte for a SUBACK return code (pure function)
    pub fn granted_qos(code: &SubscribeReasonCode) -> u8 {
        match code {
            SubscribeReasonCode::Success(qos) => *qos as u8,
            SubscribeReasonCode::Failure => SUBSCRIBE_FAILURE,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// CONNACK with its return code
    ConnectionAcknowledged { code: u8 },
    /// Message received on subscribed topic
    MessageReceived { topic: String, payload: Bytes },
    /// MQTT broker disconnected
    Disconnected,
    /// SUBACK, UNSUBACK or PUBACK
    Acknowledged {
        kind: PacketKind,
        packet_id: u16,
        granted_qos: u8,
    },
    /// A tracked request was written with the given packet id
    Sent { kind: PacketKind, packet_id: u16 },
    /// DISCONNECT written to the broker
    DisconnectSent,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Other outgoing event (handled automatically)
    OutgoingEvent,
}
