//! Client view passed to handlers
//!
//! A handler cannot await the transport, so requests made from inside a handler are
//! validated on the spot and queued. The client sends them, in order, as soon as the
//! handler returns.

use super::publisher::{plan_publish, plan_retained_request, OutboundMessage, PublishOptions, Target};
use super::state::ConnectionState;
use crate::error::ClientResult;
use crate::protocol::{SystemTopic, TimeUnit, TopicBuilder};
use std::fmt::Display;

/// Request queued by a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Subscribe(String),
    Unsubscribe(String),
    Publish(OutboundMessage),
}

/// Owner identity, connection state and queued requests
#[derive(Debug)]
pub struct Session {
    owner: String,
    state: ConnectionState,
    outbox: Vec<Command>,
}

impl Session {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            state: ConnectionState::Disconnected,
            outbox: Vec::new(),
        }
    }

    /// Account the client's topics are scoped under
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connection state as last acknowledged; the transport is not consulted
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn subscribe(&mut self, target: &Target) -> ClientResult<()> {
        let topic = target.resolve(&self.owner)?;
        self.outbox.push(Command::Subscribe(topic));
        Ok(())
    }

    /// Queue a subscription to the account's throttle or error notices
    pub fn subscribe_system(&mut self, kind: SystemTopic) {
        self.outbox
            .push(Command::Subscribe(TopicBuilder::system(&self.owner, kind)));
    }

    pub fn subscribe_time(&mut self, unit: TimeUnit) {
        self.outbox.push(Command::Subscribe(TopicBuilder::time(unit)));
    }

    pub fn unsubscribe(&mut self, target: &Target) -> ClientResult<()> {
        let topic = target.resolve(&self.owner)?;
        self.outbox.push(Command::Unsubscribe(topic));
        Ok(())
    }

    pub fn publish(&mut self, feed_key: &str, value: impl Display) -> ClientResult<()> {
        self.publish_with(&PublishOptions::new(feed_key, value))
    }

    pub fn publish_with(&mut self, options: &PublishOptions) -> ClientResult<()> {
        let message = plan_publish(&self.owner, options)?;
        self.outbox.push(Command::Publish(message));
        Ok(())
    }

    pub fn get_retained(&mut self, feed_key: &str) -> ClientResult<()> {
        let message = plan_retained_request(&self.owner, feed_key)?;
        self.outbox.push(Command::Publish(message));
        Ok(())
    }

    /// Requests queued since the last flush
    pub fn pending(&self) -> &[Command] {
        &self.outbox
    }

    pub(crate) fn take_outbox(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.outbox)
    }
}
