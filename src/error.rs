//! Error types for the feed client
//!
//! Every error is raised synchronously at the point of failure; the client never
//! retries internally. Transport causes are kept as `#[source]`.

use crate::client::EventKind;
use crate::protocol::FeedKeyError;
use thiserror::Error;

/// Boxed cause carried by transport and handler failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for feed client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid feed key: {0}")]
    InvalidFeedKey(#[from] FeedKeyError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] MqttError),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Malformed group payload on {topic}")]
    GroupPayload {
        topic: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{event} handler failed")]
    Handler {
        event: EventKind,
        #[source]
        source: BoxError,
    },
}

impl ClientError {
    /// Create configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create handler error for the given event slot
    pub fn handler(event: EventKind, source: BoxError) -> Self {
        Self::Handler { event, source }
    }

    /// True for errors the caller recovers from by backing off and retrying
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::RateLimitExceeded(_))
    }
}

/// Transport-level failures and refused connections
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Unable to connect")]
    ConnectFailed(#[source] BoxError),
    #[error("Unable to reconnect")]
    ReconnectFailed(#[source] BoxError),
    #[error("Unable to disconnect")]
    DisconnectFailed(#[source] BoxError),
    #[error("Connection refused: {} (code {code})", connack_reason(*code))]
    ConnectionRefused { code: u8 },
    #[error("Subscribe to {topic} failed")]
    SubscribeFailed {
        topic: String,
        #[source]
        source: BoxError,
    },
    #[error("Unsubscribe from {topic} failed")]
    UnsubscribeFailed {
        topic: String,
        #[source]
        source: BoxError,
    },
    #[error("Publish to {topic} failed")]
    PublishFailed {
        topic: String,
        #[source]
        source: BoxError,
    },
    #[error("Polling the transport failed")]
    PollFailed(#[source] BoxError),
}

impl MqttError {
    /// CONNACK code for refused connections
    pub fn connack_code(&self) -> Option<u8> {
        match self {
            MqttError::ConnectionRefused { code } => Some(*code),
            _ => None,
        }
    }
}

/// MQTT 3.1.1 CONNACK return code descriptions
pub fn connack_reason(code: u8) -> &'static str {
    match code {
        0 => "connection accepted",
        1 => "unacceptable protocol version",
        2 => "identifier rejected",
        3 => "server unavailable",
        4 => "bad username or password",
        5 => "not authorized",
        _ => "unknown return code",
    }
}

/// Result type for feed client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_configuration_constructor() {
        let error = ClientError::configuration("Must provide a feed_key or group_key");
        assert!(matches!(error, ClientError::Configuration { .. }));
        assert_eq!(
            error.to_string(),
            "Configuration error: Must provide a feed_key or group_key"
        );
    }

    #[test]
    fn test_connection_refused_display() {
        let error = MqttError::ConnectionRefused { code: 5 };
        assert_eq!(error.to_string(), "Connection refused: not authorized (code 5)");
        assert_eq!(error.connack_code(), Some(5));

        let unknown = MqttError::ConnectionRefused { code: 42 };
        assert!(unknown.to_string().contains("unknown return code"));
    }

    #[test]
    fn test_transport_cause_is_kept() {
        let cause: BoxError = "socket closed".into();
        let error = ClientError::from(MqttError::ConnectFailed(cause));

        let mqtt = error.source().expect("client error wraps the MQTT error");
        let root = mqtt.source().expect("MQTT error keeps the transport cause");
        assert_eq!(root.to_string(), "socket closed");
    }

    #[test]
    fn test_feed_key_error_conversion() {
        let error: ClientError = FeedKeyError::TooLong { len: 200 }.into();
        assert!(matches!(error, ClientError::InvalidFeedKey(_)));
        assert!(error.to_string().contains("200"));
    }

    #[test]
    fn test_rate_limit_classification() {
        assert!(ClientError::RateLimitExceeded("slow down".to_string()).is_rate_limited());
        assert!(!ClientError::configuration("x").is_rate_limited());
    }

    #[test]
    fn test_handler_error_display() {
        let error = ClientError::handler(EventKind::Message, "boom".into());
        assert_eq!(error.to_string(), "message handler failed");
        assert_eq!(error.source().unwrap().to_string(), "boom");
    }
}
