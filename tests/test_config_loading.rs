//! Configuration loading and validation tests
//!
//! Tests focus on the observable outcome of loading files: parsed values, defaults,
//! and which error is reported for bad input.

use feedlink::config::{ClientConfig, ConfigError};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[service]
username = "alice"
key_env = "FEEDLINK_KEY"

[mqtt]
broker_url = "mqtts://io.example.com:8883"
keep_alive_secs = 120
connect_timeout_secs = 5

[publish]
pacing_ms = 500
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.service.username, "alice");
    assert_eq!(config.service.key_env, "FEEDLINK_KEY");
    assert_eq!(config.mqtt.broker_url, "mqtts://io.example.com:8883");
    assert_eq!(config.keep_alive(), Duration::from_secs(120));
    assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    assert_eq!(config.publish.pacing(), Duration::from_millis(500));
}

#[test]
fn test_config_defaults_when_optional_fields_missing() {
    let temp_file = write_config(
        r#"
[service]
username = "alice"
key_env = "FEEDLINK_KEY"

[mqtt]
broker_url = "mqtt://localhost"
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.mqtt.keep_alive_secs, 60);
    assert_eq!(config.mqtt.connect_timeout_secs, 30);
    assert_eq!(config.publish.pacing_ms, 3000);
}

#[test]
fn test_config_missing_file() {
    let result = ClientConfig::load_from_file(Path::new("/nonexistent/feedlink.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_config_invalid_toml() {
    let temp_file = write_config("[service\nusername = ");
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_missing_required_section() {
    let temp_file = write_config(
        r#"
[mqtt]
broker_url = "mqtt://localhost"
"#,
    );
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_rejects_unsupported_broker_scheme() {
    let temp_file = write_config(
        r#"
[service]
username = "alice"
key_env = "FEEDLINK_KEY"

[mqtt]
broker_url = "http://io.example.com"
"#,
    );
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidBrokerUrl(_))));
}

#[test]
fn test_config_rejects_username_with_topic_separators() {
    let temp_file = write_config(
        r#"
[service]
username = "alice/feeds"
key_env = "FEEDLINK_KEY"

[mqtt]
broker_url = "mqtt://localhost"
"#,
    );
    let result = ClientConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidUsername(_))));
}

#[test]
fn test_service_key_read_from_environment() {
    let config = ClientConfig::from_toml(
        r#"
[service]
username = "alice"
key_env = "FEEDLINK_CONFIG_TEST_KEY"

[mqtt]
broker_url = "mqtt://localhost"
"#,
    )
    .unwrap();

    std::env::set_var("FEEDLINK_CONFIG_TEST_KEY", "aio_secret");
    assert_eq!(config.service_key().unwrap(), "aio_secret");

    std::env::remove_var("FEEDLINK_CONFIG_TEST_KEY");
    assert!(matches!(
        config.service_key(),
        Err(ConfigError::EnvVarNotFound(name)) if name == "FEEDLINK_CONFIG_TEST_KEY"
    ));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = ClientConfig::from_toml(
        r#"
[service]
username = "alice"
key_env = "FEEDLINK_KEY"

[mqtt]
broker_url = "mqtt://localhost:1883"
"#,
    )
    .unwrap();

    let shown = toml::to_string_pretty(&config).unwrap();
    assert_eq!(ClientConfig::from_toml(&shown).unwrap(), config);
}
