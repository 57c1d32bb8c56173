//! Event callback registry
//!
//! Six event slots hold at most one handler each, plus a per-feed override table.
//! Handlers receive the client's [`Session`] so they can inspect the connection and
//! queue further requests.

use super::session::Session;
use crate::error::{BoxError, ClientError, ClientResult};
use std::collections::HashMap;
use std::fmt;

/// Result returned by every handler; an `Err` propagates out of the triggering call
pub type HandlerResult = Result<(), BoxError>;

/// Handler for connect and disconnect events
pub type ConnectionCallback = Box<dyn FnMut(&mut Session) -> HandlerResult + Send>;

/// Handler for inbound data: `(session, channel, payload)`
pub type MessageCallback = Box<dyn FnMut(&mut Session, &str, &str) -> HandlerResult + Send>;

/// Handler for subscribe, unsubscribe and publish acknowledgements
pub type AckCallback = Box<dyn FnMut(&mut Session, &Ack) -> HandlerResult + Send>;

/// Event slots of the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    Message,
    Subscribe,
    Unsubscribe,
    Publish,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::Message => "message",
            EventKind::Subscribe => "subscribe",
            EventKind::Unsubscribe => "unsubscribe",
            EventKind::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Acknowledgement details passed to ack handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// Topic the acknowledged request was sent to
    pub topic: String,
    pub packet_id: u16,
    /// Granted QoS for subscriptions, zero otherwise
    pub granted_qos: u8,
}

/// Holds caller-supplied handlers
#[derive(Default)]
pub struct CallbackRegistry {
    on_connect: Option<ConnectionCallback>,
    on_disconnect: Option<ConnectionCallback>,
    on_message: Option<MessageCallback>,
    on_subscribe: Option<AckCallback>,
    on_unsubscribe: Option<AckCallback>,
    on_publish: Option<AckCallback>,
    feed_callbacks: HashMap<String, MessageCallback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_connect(&mut self, callback: ConnectionCallback) {
        self.on_connect = Some(callback);
    }

    pub fn set_on_disconnect(&mut self, callback: ConnectionCallback) {
        self.on_disconnect = Some(callback);
    }

    pub fn set_on_message(&mut self, callback: MessageCallback) {
        self.on_message = Some(callback);
    }

    pub fn set_on_subscribe(&mut self, callback: AckCallback) {
        self.on_subscribe = Some(callback);
    }

    pub fn set_on_unsubscribe(&mut self, callback: AckCallback) {
        self.on_unsubscribe = Some(callback);
    }

    pub fn set_on_publish(&mut self, callback: AckCallback) {
        self.on_publish = Some(callback);
    }

    /// Empty a slot
    pub fn clear(&mut self, kind: EventKind) {
        match kind {
            EventKind::Connect => self.on_connect = None,
            EventKind::Disconnect => self.on_disconnect = None,
            EventKind::Message => self.on_message = None,
            EventKind::Subscribe => self.on_subscribe = None,
            EventKind::Unsubscribe => self.on_unsubscribe = None,
            EventKind::Publish => self.on_publish = None,
        }
    }

    pub fn is_set(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Connect => self.on_connect.is_some(),
            EventKind::Disconnect => self.on_disconnect.is_some(),
            EventKind::Message => self.on_message.is_some(),
            EventKind::Subscribe => self.on_subscribe.is_some(),
            EventKind::Unsubscribe => self.on_unsubscribe.is_some(),
            EventKind::Publish => self.on_publish.is_some(),
        }
    }

    /// Register a per-feed override, returning the handler it replaced
    pub fn add_feed_callback(
        &mut self,
        feed_key: &str,
        callback: MessageCallback,
    ) -> Option<MessageCallback> {
        self.feed_callbacks.insert(feed_key.to_string(), callback)
    }

    pub fn remove_feed_callback(&mut self, feed_key: &str) -> Option<MessageCallback> {
        self.feed_callbacks.remove(feed_key)
    }

    pub fn has_feed_callback(&self, feed_key: &str) -> bool {
        self.feed_callbacks.contains_key(feed_key)
    }

    /// Call the connect or disconnect handler, if one is set
    pub fn notify_connection(&mut self, kind: EventKind, session: &mut Session) -> ClientResult<()> {
        let slot = match kind {
            EventKind::Connect => &mut self.on_connect,
            EventKind::Disconnect => &mut self.on_disconnect,
            _ => return Ok(()),
        };
        match slot {
            Some(callback) => callback(session).map_err(|e| ClientError::handler(kind, e)),
            None => Ok(()),
        }
    }

    /// Call an acknowledgement handler, if one is set
    pub fn notify_ack(&mut self, kind: EventKind, session: &mut Session, ack: &Ack) -> ClientResult<()> {
        let slot = match kind {
            EventKind::Subscribe => &mut self.on_subscribe,
            EventKind::Unsubscribe => &mut self.on_unsubscribe,
            EventKind::Publish => &mut self.on_publish,
            _ => return Ok(()),
        };
        match slot {
            Some(callback) => callback(session, ack).map_err(|e| ClientError::handler(kind, e)),
            None => Ok(()),
        }
    }

    /// Deliver to the general message handler.
    ///
    /// Fails with a configuration error when no handler is registered.
    pub fn deliver(&mut self, session: &mut Session, channel: &str, payload: &str) -> ClientResult<()> {
        let callback = self.on_message.as_mut().ok_or_else(|| {
            ClientError::configuration("You must define an on_message handler before messages are dispatched")
        })?;
        callback(session, channel, payload).map_err(|e| ClientError::handler(EventKind::Message, e))
    }

    /// Deliver a feed message, preferring the per-feed override for `feed_key`
    pub fn deliver_feed(&mut self, session: &mut Session, feed_key: &str, payload: &str) -> ClientResult<()> {
        match self.feed_callbacks.get_mut(feed_key) {
            Some(callback) => callback(session, feed_key, payload)
                .map_err(|e| ClientError::handler(EventKind::Message, e)),
            None => self.deliver(session, feed_key, payload),
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut feeds: Vec<&String> = self.feed_callbacks.keys().collect();
        feeds.sort();
        f.debug_struct("CallbackRegistry")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_subscribe", &self.on_subscribe.is_some())
            .field("on_unsubscribe", &self.on_unsubscribe.is_some())
            .field("on_publish", &self.on_publish.is_some())
            .field("feed_callbacks", &feeds)
            .finish()
    }
}
