//! Publish/subscribe client for feeds and groups
//!
//! [`FeedClient`] owns one [`Transport`] and drives it from the caller's task. Inbound
//! messages are only dispatched inside [`FeedClient::loop_once`]; there is no
//! background delivery and no automatic retry. The documented recovery pattern is a
//! caller loop that catches a failed `loop_once` and calls [`FeedClient::reconnect`].
//!
//! ```rust,no_run
//! use feedlink::client::{FeedClient, Target};
//! use feedlink::testing::MockTransport;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let mut client = FeedClient::new(MockTransport::new(), "alice");
//! client.on_connect(|session| {
//!     session.subscribe(&Target::feed("temperature"))?;
//!     Ok(())
//! });
//! client.on_message(|_session, feed, payload| {
//!     println!("{feed} = {payload}");
//!     Ok(())
//! });
//!
//! client.connect().await?;
//! loop {
//!     client.loop_once(Duration::from_secs(1)).await?;
//! }
//! # Ok::<(), feedlink::ClientError>(())
//! # });
//! ```

pub mod callbacks;
pub mod dispatcher;
pub mod publisher;
pub mod session;
pub mod state;

pub use callbacks::{Ack, CallbackRegistry, EventKind, HandlerResult};
pub use dispatcher::{plan_delivery, Delivery};
pub use publisher::{plan_publish, plan_retained_request, OutboundMessage, PublishOptions, Target};
pub use session::{Command, Session};
pub use state::ConnectionState;

use crate::error::{ClientError, ClientResult, MqttError};
use crate::protocol::{validate_feed_key, SystemTopic, TimeUnit, TopicBuilder};
use crate::transport::{ConnAck, Transport, TransportEvent};
use bytes::Bytes;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

/// Feed client over a single transport session
pub struct FeedClient<T: Transport> {
    transport: T,
    session: Session,
    callbacks: CallbackRegistry,
}

impl<T: Transport> FeedClient<T> {
    /// Create a client for `owner`; nothing is sent until [`connect`](Self::connect)
    pub fn new(transport: T, owner: impl Into<String>) -> Self {
        Self {
            transport,
            session: Session::new(owner),
            callbacks: CallbackRegistry::new(),
        }
    }

    pub fn owner(&self) -> &str {
        self.session.owner()
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ========== CONNECTION ==========

    /// Open the session.
    ///
    /// Transport failures become [`MqttError::ConnectFailed`]; a refused CONNACK becomes
    /// [`MqttError::ConnectionRefused`] and leaves the client disconnected.
    pub async fn connect(&mut self) -> ClientResult<()> {
        self.session.set_state(ConnectionState::Connecting);
        let span = crate::mqtt_span!(operation = "connect", owner = %self.session.owner());

        let ack = match self.transport.connect().instrument(span).await {
            Ok(ack) => ack,
            Err(e) => {
                self.session.set_state(ConnectionState::Disconnected);
                return Err(MqttError::ConnectFailed(Box::new(e)).into());
            }
        };
        self.handle_connack(ack).await
    }

    /// Re-establish a dropped session
    pub async fn reconnect(&mut self) -> ClientResult<()> {
        self.session.set_state(ConnectionState::Connecting);
        let span = crate::mqtt_span!(operation = "reconnect", owner = %self.session.owner());

        let ack = match self.transport.reconnect().instrument(span).await {
            Ok(ack) => ack,
            Err(e) => {
                self.session.set_state(ConnectionState::Disconnected);
                return Err(MqttError::ReconnectFailed(Box::new(e)).into());
            }
        };
        self.handle_connack(ack).await
    }

    /// Close the session; does nothing unless connected
    pub async fn disconnect(&mut self) -> ClientResult<()> {
        if !self.session.state().should_disconnect() {
            debug!("Disconnect requested while {}, ignoring", self.session.state());
            return Ok(());
        }

        self.transport
            .disconnect()
            .await
            .map_err(|e| MqttError::DisconnectFailed(Box::new(e)))?;
        self.handle_disconnect().await
    }

    /// Connected as far as the client knows and the transport agrees.
    ///
    /// A transport that cannot answer counts as not connected.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
            && self.transport.is_connected().unwrap_or_else(|e| {
                debug!("Transport connection check failed: {}", e);
                false
            })
    }

    async fn handle_connack(&mut self, ack: ConnAck) -> ClientResult<()> {
        self.session.set_state(ConnectionState::after_connack(ack));
        if !ack.is_success() {
            warn!("Broker refused connection with code {}", ack.code);
            return Err(MqttError::ConnectionRefused { code: ack.code }.into());
        }

        info!("Connected as {}", self.session.owner());
        let result = self
            .callbacks
            .notify_connection(EventKind::Connect, &mut self.session);
        self.settle(result).await
    }

    /// Record a session the transport dropped without a DISCONNECT.
    ///
    /// Runs the disconnect handler once; requests it queues are dropped.
    fn connection_lost(&mut self) {
        if !self.session.is_connected() {
            return;
        }
        self.session.set_state(ConnectionState::Disconnected);
        warn!("Connection to broker lost");

        let result = self
            .callbacks
            .notify_connection(EventKind::Disconnect, &mut self.session);
        let dropped = self.session.take_outbox();
        if !dropped.is_empty() {
            debug!("Dropping {} requests queued while disconnected", dropped.len());
        }
        if let Err(e) = result {
            warn!("Disconnect handler failed: {}", e);
        }
    }

    /// After a failed request, notice whether the transport went down with it
    fn check_transport(&mut self) {
        let up = self.transport.is_connected().unwrap_or_else(|e| {
            debug!("Transport connection check failed: {}", e);
            false
        });
        if !up {
            self.connection_lost();
        }
    }

    async fn handle_disconnect(&mut self) -> ClientResult<()> {
        self.session.set_state(ConnectionState::Disconnected);
        info!("Disconnected");
        let result = self
            .callbacks
            .notify_connection(EventKind::Disconnect, &mut self.session);
        self.settle(result).await
    }

    // ========== INBOUND ==========

    /// Wait up to `timeout` for one transport event and dispatch it.
    ///
    /// Returns `false` when nothing arrived. Handler, throttle and transport errors
    /// propagate to the caller. A failed poll ends the session: the client reports
    /// disconnected and the disconnect handler runs before the error is returned.
    pub async fn loop_once(&mut self, timeout: Duration) -> ClientResult<bool> {
        let event = match self.transport.poll(timeout).await {
            Ok(event) => event,
            Err(e) => {
                self.connection_lost();
                return Err(MqttError::PollFailed(Box::new(e)).into());
            }
        };

        match event {
            Some(event) => {
                self.handle_event(event).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) -> ClientResult<()> {
        match event {
            TransportEvent::ConnAck(ack) => self.handle_connack(ack).await,
            TransportEvent::Disconnected => {
                if self.session.state() == ConnectionState::Disconnected {
                    return Ok(());
                }
                self.handle_disconnect().await
            }
            TransportEvent::Message { topic, payload } => {
                let result =
                    dispatcher::dispatch(&mut self.callbacks, &mut self.session, &topic, &payload);
                self.settle(result).await
            }
            TransportEvent::SubAck {
                topic,
                packet_id,
                granted_qos,
            } => {
                let ack = Ack {
                    topic,
                    packet_id,
                    granted_qos,
                };
                self.handle_ack(EventKind::Subscribe, ack).await
            }
            TransportEvent::UnsubAck { topic, packet_id } => {
                let ack = Ack {
                    topic,
                    packet_id,
                    granted_qos: 0,
                };
                self.handle_ack(EventKind::Unsubscribe, ack).await
            }
            TransportEvent::PubAck { topic, packet_id } => {
                let ack = Ack {
                    topic,
                    packet_id,
                    granted_qos: 0,
                };
                self.handle_ack(EventKind::Publish, ack).await
            }
        }
    }

    async fn handle_ack(&mut self, kind: EventKind, ack: Ack) -> ClientResult<()> {
        debug!(topic = %ack.topic, packet_id = ack.packet_id, "{} acknowledged", kind);
        let result = self.callbacks.notify_ack(kind, &mut self.session, &ack);
        self.settle(result).await
    }

    /// Send what handlers queued, or drop it when the handler failed
    async fn settle(&mut self, result: ClientResult<()>) -> ClientResult<()> {
        if let Err(e) = result {
            let dropped = self.session.take_outbox();
            if !dropped.is_empty() {
                debug!("Dropping {} queued requests after handler failure", dropped.len());
            }
            return Err(e);
        }

        for command in self.session.take_outbox() {
            match command {
                Command::Subscribe(topic) => self.send_subscribe(topic).await?,
                Command::Unsubscribe(topic) => self.send_unsubscribe(topic).await?,
                Command::Publish(message) => self.send(message).await?,
            }
        }
        Ok(())
    }

    // ========== SUBSCRIPTIONS ==========

    /// Subscribe to a feed, a group or a shared feed
    pub async fn subscribe(&mut self, target: &Target) -> ClientResult<()> {
        let topic = target.resolve(self.session.owner())?;
        self.send_subscribe(topic).await
    }

    pub async fn unsubscribe(&mut self, target: &Target) -> ClientResult<()> {
        let topic = target.resolve(self.session.owner())?;
        self.send_unsubscribe(topic).await
    }

    /// Subscribe to the account's rate limit notices
    pub async fn subscribe_throttle(&mut self) -> ClientResult<()> {
        let topic = TopicBuilder::system(self.session.owner(), SystemTopic::Throttle);
        self.send_subscribe(topic).await
    }

    /// Subscribe to the account's error notices
    pub async fn subscribe_errors(&mut self) -> ClientResult<()> {
        let topic = TopicBuilder::system(self.session.owner(), SystemTopic::Errors);
        self.send_subscribe(topic).await
    }

    /// Subscribe to a random words stream
    pub async fn subscribe_words(&mut self, id: u32) -> ClientResult<()> {
        let topic = TopicBuilder::words(self.session.owner(), id);
        self.send_subscribe(topic).await
    }

    /// Subscribe to a weather record's forecast, e.g. `current` or `forecast_days_2`
    pub async fn subscribe_weather(&mut self, record: u32, forecast: &str) -> ClientResult<()> {
        if forecast.is_empty() || forecast.contains(['/', '+', '#']) {
            return Err(ClientError::configuration(format!(
                "Invalid forecast name '{forecast}'"
            )));
        }
        let topic = TopicBuilder::weather(self.session.owner(), record, forecast);
        self.send_subscribe(topic).await
    }

    /// Subscribe to server time
    pub async fn subscribe_time(&mut self, unit: TimeUnit) -> ClientResult<()> {
        self.send_subscribe(TopicBuilder::time(unit)).await
    }

    async fn send_subscribe(&mut self, topic: String) -> ClientResult<()> {
        debug!(topic = %topic, "Subscribing");
        if let Err(e) = self.transport.subscribe(&topic).await {
            self.check_transport();
            return Err(MqttError::SubscribeFailed {
                topic,
                source: Box::new(e),
            }
            .into());
        }
        Ok(())
    }

    async fn send_unsubscribe(&mut self, topic: String) -> ClientResult<()> {
        debug!(topic = %topic, "Unsubscribing");
        if let Err(e) = self.transport.unsubscribe(&topic).await {
            self.check_transport();
            return Err(MqttError::UnsubscribeFailed {
                topic,
                source: Box::new(e),
            }
            .into());
        }
        Ok(())
    }

    // ========== PUBLISHING ==========

    /// Publish a value to one of the account's feeds
    pub async fn publish(&mut self, feed_key: &str, value: impl Display) -> ClientResult<()> {
        self.publish_with(&PublishOptions::new(feed_key, value))
            .await
    }

    /// Publish with metadata, to a shared feed, or to a group
    pub async fn publish_with(&mut self, options: &PublishOptions) -> ClientResult<()> {
        let message = plan_publish(self.session.owner(), options)?;
        self.send(message).await
    }

    /// Publish `(feed_key, value)` pairs in order, sleeping `pacing` between them.
    ///
    /// Every key is validated before the first publish. The call takes at least
    /// `(n - 1) * pacing` and holds the caller's task for that long.
    pub async fn publish_multiple<K, V>(
        &mut self,
        items: &[(K, V)],
        pacing: Duration,
        group: bool,
    ) -> ClientResult<()>
    where
        K: AsRef<str>,
        V: Display,
    {
        let messages = items
            .iter()
            .map(|(key, value)| {
                let mut options = PublishOptions::new(key.as_ref(), value);
                options.group = group;
                plan_publish(self.session.owner(), &options)
            })
            .collect::<ClientResult<Vec<_>>>()?;

        for (index, message) in messages.into_iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(pacing).await;
            }
            self.send(message).await?;
        }
        Ok(())
    }

    /// Ask the service to re-send the feed's last value on its normal topic
    pub async fn get_retained(&mut self, feed_key: &str) -> ClientResult<()> {
        let message = plan_retained_request(self.session.owner(), feed_key)?;
        self.send(message).await
    }

    async fn send(&mut self, message: OutboundMessage) -> ClientResult<()> {
        debug!(topic = %message.topic, "Publishing");
        let OutboundMessage { topic, payload } = message;
        if let Err(e) = self.transport.publish(&topic, Bytes::from(payload)).await {
            self.check_transport();
            return Err(MqttError::PublishFailed {
                topic,
                source: Box::new(e),
            }
            .into());
        }
        Ok(())
    }

    // ========== CALLBACKS ==========

    /// Handler called with the session after every accepted connection
    pub fn on_connect<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Session) -> HandlerResult + Send + 'static,
    {
        self.callbacks.set_on_connect(Box::new(handler));
    }

    /// Handler called after the session closes
    pub fn on_disconnect<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Session) -> HandlerResult + Send + 'static,
    {
        self.callbacks.set_on_disconnect(Box::new(handler));
    }

    /// General handler called with `(session, channel, payload)`
    pub fn on_message<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Session, &str, &str) -> HandlerResult + Send + 'static,
    {
        self.callbacks.set_on_message(Box::new(handler));
    }

    pub fn on_subscribe<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Session, &Ack) -> HandlerResult + Send + 'static,
    {
        self.callbacks.set_on_subscribe(Box::new(handler));
    }

    pub fn on_unsubscribe<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Session, &Ack) -> HandlerResult + Send + 'static,
    {
        self.callbacks.set_on_unsubscribe(Box::new(handler));
    }

    pub fn on_publish<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Session, &Ack) -> HandlerResult + Send + 'static,
    {
        self.callbacks.set_on_publish(Box::new(handler));
    }

    /// Remove the handler in `kind`'s slot
    pub fn clear_handler(&mut self, kind: EventKind) {
        self.callbacks.clear(kind);
    }

    /// Route messages for `feed_key` to `handler` instead of the general handler.
    ///
    /// Replaces any handler already registered for the key. Does not subscribe.
    pub fn add_feed_callback<F>(&mut self, feed_key: &str, handler: F) -> ClientResult<()>
    where
        F: FnMut(&mut Session, &str, &str) -> HandlerResult + Send + 'static,
    {
        validate_feed_key(feed_key)?;
        if self
            .callbacks
            .add_feed_callback(feed_key, Box::new(handler))
            .is_some()
        {
            debug!(feed_key = %feed_key, "Replaced feed callback");
        }
        Ok(())
    }

    /// Send messages for `feed_key` back to the general handler
    pub fn remove_feed_callback(&mut self, feed_key: &str) -> ClientResult<()> {
        validate_feed_key(feed_key)?;
        self.callbacks.remove_feed_callback(feed_key);
        Ok(())
    }
}

impl<T: Transport> std::fmt::Debug for FeedClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("session", &self.session)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}
