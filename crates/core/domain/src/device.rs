//! 设备模型
//!
//! `DeviceConfig` 是用户提交的配置；协议字段在反序列化时一次性解析为
//! 强类型的 `ProtocolSettings`，后续轮询路径不再做动态分派。
//! `Device` 是配置加运行时状态的快照（由轮询调度器更新）。

use crate::value::DeviceData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_MODBUS_PORT: u16 = 502;
pub const DEFAULT_BACNET_PORT: u16 = 47808;
pub const DEFAULT_SNMP_PORT: u16 = 161;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeviceConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Modbus,
    Bacnet,
    Snmp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Modbus => "modbus",
            Protocol::Bacnet => "bacnet",
            Protocol::Snmp => "snmp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 设备连通状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Offline,
    Connecting,
    Online,
    Error,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Offline => "offline",
            DeviceStatus::Connecting => "connecting",
            DeviceStatus::Online => "online",
            DeviceStatus::Error => "error",
        }
    }

    /// 是否为故障状态（状态类告警在进入该状态时触发）。
    pub fn is_faulted(&self) -> bool {
        matches!(self, DeviceStatus::Offline | DeviceStatus::Error)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

/// 设备配置（线上格式为 camelCase JSON）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(rename = "pollInterval", default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(rename = "timeout", default = "default_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: ProtocolSettings,
}

impl DeviceConfig {
    pub fn protocol(&self) -> Protocol {
        self.settings.protocol()
    }

    /// 实际端口：未配置时按协议取默认值。
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(match self.protocol() {
            Protocol::Modbus => DEFAULT_MODBUS_PORT,
            Protocol::Bacnet => DEFAULT_BACNET_PORT,
            Protocol::Snmp => DEFAULT_SNMP_PORT,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 该设备会产出的全部点位键。
    pub fn point_keys(&self) -> Vec<String> {
        self.settings.point_keys()
    }

    /// 校验配置；协议适配器创建前调用。
    pub fn validate(&self) -> Result<(), DeviceConfigError> {
        if self.id.trim().is_empty() {
            return Err(DeviceConfigError::Missing("id"));
        }
        if self.name.trim().is_empty() {
            return Err(DeviceConfigError::Missing("name"));
        }
        if self.host.trim().is_empty() {
            return Err(DeviceConfigError::Missing("host"));
        }
        if self.port == Some(0) {
            return Err(invalid("port", "must be between 1 and 65535"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("pollInterval", "must be positive"));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout", "must be positive"));
        }
        self.settings.validate()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> DeviceConfigError {
    DeviceConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// 协议相关配置（按 `protocol` 字段打标签）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "protocol",
    rename_all = "lowercase",
    rename_all_fields = "camelCase"
)]
pub enum ProtocolSettings {
    Modbus {
        #[serde(default = "default_unit_id")]
        unit_id: u8,
        points: Vec<ModbusPoint>,
    },
    Bacnet {
        device_id: u32,
        points: Vec<BacnetPoint>,
    },
    Snmp {
        #[serde(rename = "deviceId", default = "default_community")]
        community: String,
        #[serde(default)]
        version: SnmpVersion,
        points: Vec<SnmpPoint>,
    },
}

fn default_unit_id() -> u8 {
    1
}

fn default_community() -> String {
    "public".to_string()
}

impl ProtocolSettings {
    pub fn protocol(&self) -> Protocol {
        match self {
            ProtocolSettings::Modbus { .. } => Protocol::Modbus,
            ProtocolSettings::Bacnet { .. } => Protocol::Bacnet,
            ProtocolSettings::Snmp { .. } => Protocol::Snmp,
        }
    }

    pub fn point_keys(&self) -> Vec<String> {
        match self {
            ProtocolSettings::Modbus { points, .. } => points.iter().map(|p| p.key()).collect(),
            ProtocolSettings::Bacnet { points, .. } => points.iter().map(|p| p.key()).collect(),
            ProtocolSettings::Snmp { points, .. } => points.iter().map(|p| p.key()).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), DeviceConfigError> {
        let keys = self.point_keys();
        if keys.is_empty() {
            return Err(DeviceConfigError::Missing("points"));
        }
        let mut seen = HashSet::new();
        for key in &keys {
            if !seen.insert(key.as_str()) {
                return Err(invalid("points", format!("duplicate point {}", key)));
            }
        }
        match self {
            ProtocolSettings::Modbus { points, .. } => {
                for point in points {
                    if !point.scale.is_finite() || !point.offset.is_finite() {
                        return Err(invalid("points", "scale and offset must be finite"));
                    }
                    let (_, start) = point.resolve();
                    if u32::from(start) + u32::from(point.register_count()) > 0x1_0000 {
                        return Err(invalid(
                            "points",
                            format!("register range out of bounds for {}", point.key()),
                        ));
                    }
                }
            }
            ProtocolSettings::Bacnet { device_id, points } => {
                if *device_id > BACNET_MAX_INSTANCE {
                    return Err(invalid("deviceId", "exceeds 4194303"));
                }
                for point in points {
                    if point.instance > BACNET_MAX_INSTANCE {
                        return Err(invalid(
                            "points",
                            format!("instance exceeds 4194303 for {}", point.key()),
                        ));
                    }
                }
            }
            ProtocolSettings::Snmp {
                community, points, ..
            } => {
                if community.is_empty() {
                    return Err(DeviceConfigError::Missing("deviceId"));
                }
                for point in points {
                    validate_oid(&point.oid)?;
                }
            }
        }
        Ok(())
    }
}

const BACNET_MAX_INSTANCE: u32 = 0x3F_FFFF;

fn validate_oid(oid: &str) -> Result<(), DeviceConfigError> {
    let arcs: Vec<&str> = oid.trim_start_matches('.').split('.').collect();
    if arcs.len() < 2 || arcs.iter().any(|arc| arc.parse::<u32>().is_err()) {
        return Err(invalid("points", format!("malformed oid {}", oid)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Modbus
// ---------------------------------------------------------------------------

/// 寄存器类型（功能码 0x03 / 0x04）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    Holding,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModbusDataType {
    Int16,
    #[default]
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
}

impl ModbusDataType {
    pub fn register_count(&self) -> u16 {
        match self {
            ModbusDataType::Int16 | ModbusDataType::Uint16 => 1,
            ModbusDataType::Int32 | ModbusDataType::Uint32 | ModbusDataType::Float32 => 2,
            ModbusDataType::Float64 => 4,
        }
    }
}

/// 多寄存器值的字序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WordOrder {
    #[default]
    Big,
    Little,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ModbusPointRepr")]
pub struct ModbusPoint {
    pub address: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<RegisterKind>,
    pub data_type: ModbusDataType,
    pub word_order: WordOrder,
    pub scale: f64,
    pub offset: f64,
}

impl ModbusPoint {
    pub fn new(address: u16) -> Self {
        Self {
            address,
            function: None,
            data_type: ModbusDataType::default(),
            word_order: WordOrder::default(),
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub fn key(&self) -> String {
        format!("register_{}", self.address)
    }

    /// 解析寄存器类型和协议偏移量。
    ///
    /// 未显式指定功能码时按传统编址：40001–49999 为保持寄存器，
    /// 30001–39999 为输入寄存器，其余按保持寄存器原地址读取。
    pub fn resolve(&self) -> (RegisterKind, u16) {
        match self.function {
            Some(kind) => (kind, self.address),
            None => match self.address {
                40001..=49999 => (RegisterKind::Holding, self.address - 40001),
                30001..=39999 => (RegisterKind::Input, self.address - 30001),
                other => (RegisterKind::Holding, other),
            },
        }
    }

    pub fn register_count(&self) -> u16 {
        self.data_type.register_count()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModbusPointRepr {
    Address(u16),
    Text(String),
    Detailed(DetailedModbusPoint),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailedModbusPoint {
    address: u16,
    #[serde(default)]
    function: Option<RegisterKind>,
    #[serde(default)]
    data_type: ModbusDataType,
    #[serde(default)]
    word_order: WordOrder,
    #[serde(default)]
    scale: Option<f64>,
    #[serde(default)]
    offset: Option<f64>,
}

impl TryFrom<ModbusPointRepr> for ModbusPoint {
    type Error = String;

    fn try_from(repr: ModbusPointRepr) -> Result<Self, Self::Error> {
        match repr {
            ModbusPointRepr::Address(address) => Ok(ModbusPoint::new(address)),
            ModbusPointRepr::Text(text) => text
                .trim()
                .parse::<u16>()
                .map(ModbusPoint::new)
                .map_err(|_| format!("invalid register address: {}", text)),
            ModbusPointRepr::Detailed(point) => Ok(ModbusPoint {
                address: point.address,
                function: point.function,
                data_type: point.data_type,
                word_order: point.word_order,
                scale: point.scale.unwrap_or(1.0),
                offset: point.offset.unwrap_or(0.0),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// BACnet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BacnetObjectType {
    AnalogInput,
    AnalogOutput,
    AnalogValue,
    BinaryInput,
    BinaryOutput,
    BinaryValue,
    Device,
    MultiStateInput,
    MultiStateOutput,
    MultiStateValue,
}

impl BacnetObjectType {
    pub fn code(&self) -> u16 {
        match self {
            BacnetObjectType::AnalogInput => 0,
            BacnetObjectType::AnalogOutput => 1,
            BacnetObjectType::AnalogValue => 2,
            BacnetObjectType::BinaryInput => 3,
            BacnetObjectType::BinaryOutput => 4,
            BacnetObjectType::BinaryValue => 5,
            BacnetObjectType::Device => 8,
            BacnetObjectType::MultiStateInput => 13,
            BacnetObjectType::MultiStateOutput => 14,
            BacnetObjectType::MultiStateValue => 19,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => BacnetObjectType::AnalogInput,
            1 => BacnetObjectType::AnalogOutput,
            2 => BacnetObjectType::AnalogValue,
            3 => BacnetObjectType::BinaryInput,
            4 => BacnetObjectType::BinaryOutput,
            5 => BacnetObjectType::BinaryValue,
            8 => BacnetObjectType::Device,
            13 => BacnetObjectType::MultiStateInput,
            14 => BacnetObjectType::MultiStateOutput,
            19 => BacnetObjectType::MultiStateValue,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BacnetObjectType::AnalogInput => "analog-input",
            BacnetObjectType::AnalogOutput => "analog-output",
            BacnetObjectType::AnalogValue => "analog-value",
            BacnetObjectType::BinaryInput => "binary-input",
            BacnetObjectType::BinaryOutput => "binary-output",
            BacnetObjectType::BinaryValue => "binary-value",
            BacnetObjectType::Device => "device",
            BacnetObjectType::MultiStateInput => "multi-state-input",
            BacnetObjectType::MultiStateOutput => "multi-state-output",
            BacnetObjectType::MultiStateValue => "multi-state-value",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacnetPoint {
    pub object_type: BacnetObjectType,
    pub instance: u32,
}

impl BacnetPoint {
    pub fn key(&self) -> String {
        format!("{}_{}", self.object_type.as_str(), self.instance)
    }
}

// ---------------------------------------------------------------------------
// SNMP
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SnmpVersion {
    V1,
    #[default]
    V2c,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SnmpPointRepr")]
pub struct SnmpPoint {
    pub oid: String,
}

impl SnmpPoint {
    pub fn new(oid: impl Into<String>) -> Self {
        Self { oid: oid.into() }
    }

    pub fn key(&self) -> String {
        self.oid.clone()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnmpPointRepr {
    Oid(String),
    Detailed { oid: String },
}

impl From<SnmpPointRepr> for SnmpPoint {
    fn from(repr: SnmpPointRepr) -> Self {
        match repr {
            SnmpPointRepr::Oid(oid) | SnmpPointRepr::Detailed { oid } => SnmpPoint::new(oid),
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime snapshot
// ---------------------------------------------------------------------------

/// 设备运行时快照：配置 + 轮询状态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(flatten)]
    pub config: DeviceConfig,
    pub status: DeviceStatus,
    pub last_data: DeviceData,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            status: DeviceStatus::Offline,
            last_data: DeviceData::new(),
            last_updated: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_addresses_resolve_to_offsets() {
        assert_eq!(
            ModbusPoint::new(40001).resolve(),
            (RegisterKind::Holding, 0)
        );
        assert_eq!(
            ModbusPoint::new(30010).resolve(),
            (RegisterKind::Input, 9)
        );
        assert_eq!(ModbusPoint::new(100).resolve(), (RegisterKind::Holding, 100));
        let mut explicit = ModbusPoint::new(40001);
        explicit.function = Some(RegisterKind::Input);
        assert_eq!(explicit.resolve(), (RegisterKind::Input, 40001));
    }

    #[test]
    fn bacnet_key_uses_object_type_name() {
        let point = BacnetPoint {
            object_type: BacnetObjectType::AnalogInput,
            instance: 1,
        };
        assert_eq!(point.key(), "analog-input_1");
        assert_eq!(BacnetObjectType::from_code(19), Some(BacnetObjectType::MultiStateValue));
    }

    #[test]
    fn oid_validation() {
        assert!(validate_oid("1.3.6.1.2.1.1.3.0").is_ok());
        assert!(validate_oid(".1.3.6").is_ok());
        assert!(validate_oid("1.3.x").is_err());
        assert!(validate_oid("1").is_err());
    }
}
