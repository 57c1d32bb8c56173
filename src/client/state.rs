//! Connection state machine
//!
//! `Disconnected` is both the initial and terminal state. `Connecting` only exists
//! while a connect or reconnect call is waiting for the broker.

use crate::transport::ConnAck;
use std::fmt;

/// Connection state for the feed client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// State after a CONNACK (pure function)
    pub fn after_connack(ack: ConnAck) -> ConnectionState {
        if ack.is_success() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Whether `disconnect()` has anything to close (pure function)
    pub fn should_disconnect(&self) -> bool {
        self.is_connected()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}
