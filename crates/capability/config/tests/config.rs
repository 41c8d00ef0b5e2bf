use gateway_config::{AppConfig, ConfigError};
use std::collections::HashMap;

fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
    let values: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    AppConfig::from_lookup(&|key| values.get(key).cloned())
}

#[test]
fn defaults_apply_when_env_is_empty() {
    let config = load(&[]).expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8080");
    assert_eq!(config.config_path, "data/gateway.json");
    assert!(config.database_url.is_none());
    assert!(config.mqtt.enabled);
    assert_eq!(config.mqtt.port, 1883);
    assert_eq!(config.mqtt.base_topic, "iot/gateway");
    assert_eq!(config.mqtt.qos, 0);
    assert_eq!(config.offline_threshold, 3);
    assert_eq!(config.history_prune_interval_seconds, 3600);
    assert_eq!(config.event_buffer, 256);
}

#[test]
fn overrides_are_parsed() {
    let config = load(&[
        ("GATEWAY_HTTP_ADDR", "0.0.0.0:9000"),
        ("GATEWAY_MQTT_ENABLED", "off"),
        ("GATEWAY_MQTT_BASE_TOPIC", "plant/a/"),
        ("GATEWAY_MQTT_QOS", "1"),
        ("GATEWAY_OFFLINE_THRESHOLD", "5"),
        ("GATEWAY_BACNET_DISCOVERY_SECONDS", "120"),
        ("GATEWAY_DATABASE_URL", "postgres://localhost/gateway"),
    ])
    .expect("config");
    assert_eq!(config.http_addr, "0.0.0.0:9000");
    assert!(!config.mqtt.enabled);
    assert_eq!(config.mqtt.base_topic, "plant/a");
    assert_eq!(config.mqtt.qos, 1);
    assert_eq!(config.offline_threshold, 5);
    assert_eq!(config.bacnet_discovery_seconds, 25);
    assert_eq!(
        config.database_url.as_deref(),
        Some("postgres://localhost/gateway")
    );
}

#[test]
fn invalid_values_are_rejected() {
    assert_eq!(
        load(&[("GATEWAY_MQTT_PORT", "abc")]),
        Err(ConfigError::Invalid(
            "GATEWAY_MQTT_PORT".to_string(),
            "abc".to_string()
        ))
    );
    assert!(matches!(
        load(&[("GATEWAY_MQTT_QOS", "3")]),
        Err(ConfigError::Invalid(..))
    ));
    assert_eq!(
        load(&[("GATEWAY_MQTT_PASSWORD", "secret")]),
        Err(ConfigError::Missing("GATEWAY_MQTT_USERNAME".to_string()))
    );
}
