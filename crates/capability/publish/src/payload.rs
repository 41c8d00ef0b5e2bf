//! MQTT 负载格式

use crate::PublishError;
use chrono::{DateTime, SecondsFormat, Utc};
use domain::{Device, DeviceData};
use serde::Serialize;

/// `{deviceId, deviceName, protocol, timestamp, data}`，字段顺序固定。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttPayload<'a> {
    pub device_id: &'a str,
    pub device_name: &'a str,
    pub protocol: &'static str,
    pub timestamp: String,
    pub data: &'a DeviceData,
}

/// ISO-8601 UTC，毫秒精度，`Z` 结尾。
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn encode_payload(device: &Device, timestamp: DateTime<Utc>) -> Result<Vec<u8>, PublishError> {
    let payload = MqttPayload {
        device_id: &device.config.id,
        device_name: &device.config.name,
        protocol: device.config.protocol().as_str(),
        timestamp: format_timestamp(timestamp),
        data: &device.last_data,
    };
    serde_json::to_vec(&payload).map_err(|err| PublishError::Payload(err.to_string()))
}
