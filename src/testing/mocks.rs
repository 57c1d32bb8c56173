//! Mock transport for testing
//!
//! Records every transport call with the (tokio) time it was made and replays a
//! scripted queue of inbound events from `poll`.

use crate::transport::{ConnAck, Transport, TransportEvent};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Mock transport failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockTransportError {
    #[error("Mock transport failure: {0}")]
    Failure(String),
}

/// A call made on the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect,
    Reconnect,
    Disconnect,
    Subscribe(String),
    Unsubscribe(String),
    Publish { topic: String, payload: Bytes },
}

/// A call and the instant it was made
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call: TransportCall,
    pub at: Instant,
}

/// Scriptable transport; clones share the call log and the inbound queue
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
    pub inbound: Arc<Mutex<VecDeque<TransportEvent>>>,
    /// CONNACK code returned by `connect` and `reconnect`
    pub connack_code: u8,
    /// Every call fails
    pub should_fail: bool,
    /// `is_connected` returns an error
    pub fail_connection_check: bool,
    /// Queue a SUBACK, UNSUBACK or PUBACK after every request
    pub auto_ack: bool,
    connected: bool,
    next_packet_id: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// Refuse connections with the given CONNACK code
    pub fn refusing(code: u8) -> Self {
        Self {
            connack_code: code,
            ..Default::default()
        }
    }

    pub fn with_auto_ack() -> Self {
        Self {
            auto_ack: true,
            ..Default::default()
        }
    }

    /// Queue an inbound event for `poll`
    pub async fn push_event(&self, event: TransportEvent) {
        self.inbound.lock().await.push_back(event);
    }

    /// Queue an inbound message for `poll`
    pub async fn push_message(&self, topic: &str, payload: impl Into<Bytes>) {
        self.push_event(TransportEvent::Message {
            topic: topic.to_string(),
            payload: payload.into(),
        })
        .await;
    }

    pub async fn get_calls(&self) -> Vec<TransportCall> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|recorded| recorded.call.clone())
            .collect()
    }

    pub async fn get_recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// `(topic, payload)` of every publish, payloads as text
    pub async fn get_published(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|recorded| match &recorded.call {
                TransportCall::Publish { topic, payload } => Some((
                    topic.clone(),
                    String::from_utf8_lossy(payload).into_owned(),
                )),
                _ => None,
            })
            .collect()
    }

    pub async fn get_subscriptions(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|recorded| match &recorded.call {
                TransportCall::Subscribe(topic) => Some(topic.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn clear_history(&self) {
        self.calls.lock().await.clear();
    }

    async fn record(&mut self, call: TransportCall) -> Result<(), MockTransportError> {
        self.calls.lock().await.push(RecordedCall {
            call,
            at: Instant::now(),
        });
        if self.should_fail {
            self.connected = false;
            return Err(MockTransportError::Failure("scripted failure".to_string()));
        }
        Ok(())
    }

    async fn acknowledge(&mut self, event: impl FnOnce(u16) -> TransportEvent) {
        if self.auto_ack {
            self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
            let event = event(self.next_packet_id);
            self.push_event(event).await;
        }
    }

    fn connack(&mut self) -> ConnAck {
        let ack = ConnAck {
            code: self.connack_code,
        };
        self.connected = ack.is_success();
        ack
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self) -> Result<ConnAck, Self::Error> {
        self.record(TransportCall::Connect).await?;
        Ok(self.connack())
    }

    async fn reconnect(&mut self) -> Result<ConnAck, Self::Error> {
        self.record(TransportCall::Reconnect).await?;
        Ok(self.connack())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.record(TransportCall::Disconnect).await?;
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> Result<bool, Self::Error> {
        if self.fail_connection_check {
            return Err(MockTransportError::Failure("connection check".to_string()));
        }
        Ok(self.connected)
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.record(TransportCall::Subscribe(topic.to_string()))
            .await?;
        let topic = topic.to_string();
        self.acknowledge(|packet_id| TransportEvent::SubAck {
            topic,
            packet_id,
            granted_qos: 1,
        })
        .await;
        Ok(())
    }

    async fn unsubscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        self.record(TransportCall::Unsubscribe(topic.to_string()))
            .await?;
        let topic = topic.to_string();
        self.acknowledge(|packet_id| TransportEvent::UnsubAck { topic, packet_id })
            .await;
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Bytes) -> Result<(), Self::Error> {
        self.record(TransportCall::Publish {
            topic: topic.to_string(),
            payload,
        })
        .await?;
        let topic = topic.to_string();
        self.acknowledge(|packet_id| TransportEvent::PubAck { topic, packet_id })
            .await;
        Ok(())
    }

    async fn poll(&mut self, _timeout: Duration) -> Result<Option<TransportEvent>, Self::Error> {
        if self.should_fail {
            self.connected = false;
            return Err(MockTransportError::Failure("scripted failure".to_string()));
        }
        Ok(self.inbound.lock().await.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_calls_are_recorded_in_order() {
        let mut transport = MockTransport::new();
        let handle = transport.clone();

        transport.connect().await.unwrap();
        transport.subscribe("alice/feeds/a").await.unwrap();
        transport
            .publish("alice/feeds/a", Bytes::from("1"))
            .await
            .unwrap();

        assert_eq!(
            handle.get_calls().await,
            vec![
                TransportCall::Connect,
                TransportCall::Subscribe("alice/feeds/a".to_string()),
                TransportCall::Publish {
                    topic: "alice/feeds/a".to_string(),
                    payload: Bytes::from("1")
                },
            ]
        );
        assert_eq!(
            handle.get_published().await,
            vec![("alice/feeds/a".to_string(), "1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_scripted_connack() {
        let mut refusing = MockTransport::refusing(5);
        assert_eq!(refusing.connect().await.unwrap(), ConnAck { code: 5 });
        assert!(!refusing.is_connected().unwrap());

        let mut accepting = MockTransport::new();
        assert!(accepting.connect().await.unwrap().is_success());
        assert!(accepting.is_connected().unwrap());
    }

    #[tokio::test]
    async fn test_auto_ack_queues_acknowledgements() {
        let mut transport = MockTransport::with_auto_ack();
        transport.subscribe("alice/feeds/a").await.unwrap();
        transport.unsubscribe("alice/feeds/a").await.unwrap();

        assert_eq!(
            transport.poll(Duration::ZERO).await.unwrap(),
            Some(TransportEvent::SubAck {
                topic: "alice/feeds/a".to_string(),
                packet_id: 1,
                granted_qos: 1
            })
        );
        assert_eq!(
            transport.poll(Duration::ZERO).await.unwrap(),
            Some(TransportEvent::UnsubAck {
                topic: "alice/feeds/a".to_string(),
                packet_id: 2
            })
        );
        assert_eq!(transport.poll(Duration::ZERO).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_mode() {
        let mut transport = MockTransport::with_failure();
        assert!(transport.connect().await.is_err());
        assert!(transport.poll(Duration::ZERO).await.is_err());
        // Failed calls are still recorded
        assert_eq!(transport.get_calls().await, vec![TransportCall::Connect]);
    }
}
