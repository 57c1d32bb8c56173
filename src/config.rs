//! Configuration system for the feed client
//!
//! Configuration is a TOML file with three sections: the service account, the MQTT
//! broker, and publish pacing. Secrets never live in the file; the service key is read
//! from the environment variable named by `key_env` when the transport is built.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub service: ServiceSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub publish: PublishSection,
}

/// Service account section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSection {
    /// Account name; every topic is scoped under it
    pub username: String,
    /// Environment variable containing the service key
    pub key_env: String,
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL, `mqtt://host[:port]` or `mqtts://host[:port]`
    pub broker_url: String,
    /// Keep-alive interval in seconds (default: 60)
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Upper bound on waiting for CONNACK, in seconds (default: 30)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

/// Publish pacing section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishSection {
    /// Delay between messages of a multi-publish, in milliseconds (default: 3000)
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
}

fn default_pacing_ms() -> u64 {
    3000
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
        }
    }
}

impl PublishSection {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid username: {0}")]
    InvalidUsername(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
}

impl ClientConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the username and broker URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_username(&self.service.username)?;
        parse_broker_url(&self.mqtt.broker_url)?;
        Ok(())
    }

    /// Get the service key from its environment variable
    pub fn service_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.service.key_env)
            .map_err(|_| ConfigError::EnvVarNotFound(self.service.key_env.clone()))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.mqtt.connect_timeout_secs)
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[service]
username = "test-user"
key_env = "FEEDLINK_TEST_KEY"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Broker endpoint extracted from the configured URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse `mqtt://` and `mqtts://` URLs, defaulting the port per scheme
pub fn parse_broker_url(broker_url: &str) -> Result<BrokerEndpoint, ConfigError> {
    let url =
        Url::parse(broker_url).map_err(|_| ConfigError::InvalidBrokerUrl(broker_url.to_string()))?;

    let tls = match url.scheme() {
        "mqtt" => false,
        "mqtts" => true,
        _ => return Err(ConfigError::InvalidBrokerUrl(broker_url.to_string())),
    };

    let host = url
        .host_str()
        .ok_or_else(|| ConfigError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok(BrokerEndpoint {
        host: host.to_string(),
        port,
        tls,
    })
}

/// Usernames become the first topic segment, so topic separators and wildcards are rejected
fn validate_username(username: &str) -> Result<(), ConfigError> {
    if username.is_empty() || username.contains(['/', '+', '#']) {
        return Err(ConfigError::InvalidUsername(format!(
            "'{username}' must be non-empty and contain no '/', '+' or '#'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[service]
username = "alice"
key_env = "AIO_KEY"

[mqtt]
broker_url = "mqtts://io.example.com"
keep_alive_secs = 30
connect_timeout_secs = 10

[publish]
pacing_ms = 1500
"#;

        let config = ClientConfig::from_toml(toml_content).unwrap();
        assert_eq!(config.service.username, "alice");
        assert_eq!(config.service.key_env, "AIO_KEY");
        assert_eq!(config.keep_alive(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.publish.pacing(), Duration::from_millis(1500));
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::test_config();
        assert_eq!(config.mqtt.keep_alive_secs, 60);
        assert_eq!(config.mqtt.connect_timeout_secs, 30);
        assert_eq!(config.publish.pacing_ms, 3000);
    }

    #[test]
    fn test_parse_broker_url() {
        assert_eq!(
            parse_broker_url("mqtt://localhost").unwrap(),
            BrokerEndpoint {
                host: "localhost".to_string(),
                port: 1883,
                tls: false
            }
        );
        assert_eq!(
            parse_broker_url("mqtts://io.example.com").unwrap().port,
            8883
        );
        assert_eq!(parse_broker_url("mqtt://broker:2883").unwrap().port, 2883);

        assert!(matches!(
            parse_broker_url("http://broker"),
            Err(ConfigError::InvalidBrokerUrl(_))
        ));
        assert!(matches!(
            parse_broker_url("invalid-url"),
            Err(ConfigError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn test_invalid_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("a/b").is_err());
        assert!(validate_username("a+").is_err());
        assert!(validate_username("#").is_err());
    }

    #[test]
    fn test_missing_service_key() {
        let mut config = ClientConfig::test_config();
        config.service.key_env = "FEEDLINK_KEY_THAT_IS_NOT_SET".to_string();
        assert!(matches!(
            config.service_key(),
            Err(ConfigError::EnvVarNotFound(_))
        ));
    }
}
