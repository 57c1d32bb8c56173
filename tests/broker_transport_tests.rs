//! Integration tests for the rumqttc-backed transport
//!
//! These run without a broker: they cover construction from configuration and how
//! connection failures surface through the feed client.

use feedlink::config::{ClientConfig, ConfigError};
use feedlink::error::{ClientError, MqttError};
use feedlink::transport::mqtt::{BrokerTransport, BrokerTransportError};
use feedlink::transport::Transport;
use feedlink::FeedClient;

fn config_for(broker_url: &str, key_env: &str) -> ClientConfig {
    ClientConfig::from_toml(&format!(
        r#"
[service]
username = "alice"
key_env = "{key_env}"

[mqtt]
broker_url = "{broker_url}"
connect_timeout_secs = 2
"#
    ))
    .unwrap()
}

#[tokio::test]
async fn test_transport_creation_from_config() {
    // Arrange: Key present in the environment
    std::env::set_var("FEEDLINK_TRANSPORT_TEST_KEY", "secret");
    let config = config_for("mqtt://localhost:1883", "FEEDLINK_TRANSPORT_TEST_KEY");

    // Act
    let transport = BrokerTransport::from_config(&config).unwrap();

    // Assert: Created but not connected until connect() is called
    assert!(!transport.is_connected().unwrap());
}

#[tokio::test]
async fn test_transport_creation_with_tls() {
    std::env::set_var("FEEDLINK_TRANSPORT_TLS_KEY", "secret");
    let config = config_for("mqtts://localhost", "FEEDLINK_TRANSPORT_TLS_KEY");

    assert!(BrokerTransport::from_config(&config).is_ok());
}

#[tokio::test]
async fn test_transport_creation_without_key() {
    let config = config_for("mqtt://localhost:1883", "FEEDLINK_TRANSPORT_MISSING_KEY");

    let result = BrokerTransport::from_config(&config);

    assert!(matches!(
        result,
        Err(BrokerTransportError::Config(ConfigError::EnvVarNotFound(_)))
    ));
}

#[tokio::test]
async fn test_client_connect_to_closed_port_fails() {
    // Arrange: Nothing listens on port 1
    std::env::set_var("FEEDLINK_TRANSPORT_CLOSED_KEY", "secret");
    let config = config_for("mqtt://127.0.0.1:1", "FEEDLINK_TRANSPORT_CLOSED_KEY");
    let transport = BrokerTransport::from_config(&config).unwrap();
    let mut client = FeedClient::new(transport, "alice");

    // Act
    let result = client.connect().await;

    // Assert: The transport failure is wrapped, never swallowed
    assert!(matches!(
        result,
        Err(ClientError::Mqtt(MqttError::ConnectFailed(_)))
    ));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_disconnect_before_connect_is_noop() {
    std::env::set_var("FEEDLINK_TRANSPORT_NOOP_KEY", "secret");
    let config = config_for("mqtt://127.0.0.1:1", "FEEDLINK_TRANSPORT_NOOP_KEY");
    let transport = BrokerTransport::from_config(&config).unwrap();
    let mut client = FeedClient::new(transport, "alice");

    assert!(client.disconnect().await.is_ok());
}
