//! 网关运行配置加载。
//!
//! 所有配置项来自 `GATEWAY_*` 环境变量，`.env` 由 main 通过 dotenvy 预先加载。

use std::env;
use std::time::Duration;

/// BACnet 发现的时间上限（秒）。
pub const MAX_BACNET_DISCOVERY_SECONDS: u64 = 25;

/// 配置加载错误。
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// MQTT 发布配置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub base_topic: String,
    pub qos: u8,
}

/// 应用运行配置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub http_addr: String,
    pub config_path: String,
    pub database_url: Option<String>,
    pub mqtt: MqttConfig,
    pub offline_threshold: u32,
    pub observer_timeout_ms: u64,
    pub history_prune_interval_seconds: u64,
    pub email_timeout_seconds: u64,
    pub bacnet_discovery_seconds: u64,
    pub event_buffer: usize,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置（测试中使用固定映射）。
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let http_addr = read_string_with_default(lookup, "GATEWAY_HTTP_ADDR", "127.0.0.1:8080");
        let config_path =
            read_string_with_default(lookup, "GATEWAY_CONFIG_PATH", "data/gateway.json");
        let database_url = read_optional(lookup, "GATEWAY_DATABASE_URL");

        let mqtt_enabled = read_bool_with_default(lookup, "GATEWAY_MQTT_ENABLED", true);
        let mqtt_host = read_string_with_default(lookup, "GATEWAY_MQTT_HOST", "127.0.0.1");
        let mqtt_port = read_u16_with_default(lookup, "GATEWAY_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional(lookup, "GATEWAY_MQTT_USERNAME");
        let mqtt_password = read_optional(lookup, "GATEWAY_MQTT_PASSWORD");
        if mqtt_password.is_some() && mqtt_username.is_none() {
            return Err(ConfigError::Missing("GATEWAY_MQTT_USERNAME".to_string()));
        }
        let mqtt_client_id = read_optional(lookup, "GATEWAY_MQTT_CLIENT_ID")
            .unwrap_or_else(|| format!("iot-gateway-{}", std::process::id()));
        let mqtt_base_topic =
            read_string_with_default(lookup, "GATEWAY_MQTT_BASE_TOPIC", "iot/gateway")
                .trim_end_matches('/')
                .to_string();
        let mqtt_qos = read_u8_with_default(lookup, "GATEWAY_MQTT_QOS", 0)?;
        if mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "GATEWAY_MQTT_QOS".to_string(),
                mqtt_qos.to_string(),
            ));
        }

        let offline_threshold = read_u32_with_default(lookup, "GATEWAY_OFFLINE_THRESHOLD", 3)?;
        if offline_threshold == 0 {
            return Err(ConfigError::Invalid(
                "GATEWAY_OFFLINE_THRESHOLD".to_string(),
                "0".to_string(),
            ));
        }
        let observer_timeout_ms =
            read_u64_with_default(lookup, "GATEWAY_OBSERVER_TIMEOUT_MS", 2_000)?;
        let history_prune_interval_seconds =
            read_u64_with_default(lookup, "GATEWAY_HISTORY_PRUNE_INTERVAL_SECONDS", 3_600)?;
        let email_timeout_seconds =
            read_u64_with_default(lookup, "GATEWAY_EMAIL_TIMEOUT_SECONDS", 20)?;
        let bacnet_discovery_seconds =
            read_u64_with_default(lookup, "GATEWAY_BACNET_DISCOVERY_SECONDS", 10)?
                .clamp(1, MAX_BACNET_DISCOVERY_SECONDS);
        let event_buffer = read_u64_with_default(lookup, "GATEWAY_EVENT_BUFFER", 256)?.max(1);

        Ok(Self {
            http_addr,
            config_path,
            database_url,
            mqtt: MqttConfig {
                enabled: mqtt_enabled,
                host: mqtt_host,
                port: mqtt_port,
                username: mqtt_username,
                password: mqtt_password,
                client_id: mqtt_client_id,
                base_topic: mqtt_base_topic,
                qos: mqtt_qos,
            },
            offline_threshold,
            observer_timeout_ms,
            history_prune_interval_seconds,
            email_timeout_seconds,
            bacnet_discovery_seconds,
            event_buffer: usize::try_from(event_buffer).unwrap_or(usize::MAX),
        })
    }

    pub fn observer_timeout(&self) -> Duration {
        Duration::from_millis(self.observer_timeout_ms)
    }

    pub fn history_prune_interval(&self) -> Duration {
        Duration::from_secs(self.history_prune_interval_seconds.max(1))
    }

    pub fn email_timeout(&self) -> Duration {
        Duration::from_secs(self.email_timeout_seconds)
    }

    pub fn bacnet_discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.bacnet_discovery_seconds)
    }
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn read_string_with_default(lookup: Lookup<'_>, key: &str, default: &str) -> String {
    read_optional(lookup, key).unwrap_or_else(|| default.to_string())
}

fn read_u16_with_default(lookup: Lookup<'_>, key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match read_optional(lookup, key) {
        Some(value) => value,
        None => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(lookup: Lookup<'_>, key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match read_optional(lookup, key) {
        Some(value) => value,
        None => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(lookup: Lookup<'_>, key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match read_optional(lookup, key) {
        Some(value) => value,
        None => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(lookup: Lookup<'_>, key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match read_optional(lookup, key) {
        Some(value) => value,
        None => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(lookup: Lookup<'_>, key: &str) -> Option<String> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn read_bool_with_default(lookup: Lookup<'_>, key: &str, default: bool) -> bool {
    match read_optional(lookup, key) {
        Some(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        None => default,
    }
}
