pub mod alarm;
pub mod device;
pub mod history;
pub mod value;

pub use alarm::{
    ActiveAlarm, AlarmCondition, AlarmRule, AlarmType, ComparisonOperator, RuleError, Severity,
};
pub use device::{
    BacnetObjectType, BacnetPoint, Device, DeviceConfig, DeviceConfigError, DeviceStatus,
    ModbusDataType, ModbusPoint, Protocol, ProtocolSettings, RegisterKind, SnmpPoint, SnmpVersion,
    WordOrder,
};
pub use history::{
    ExportFormat, HistoryLogger, HistoryRecord, LoggerError, LoggerStats, MAX_RETENTION_DAYS,
};
pub use value::{DeviceData, PointValue};

/// 当前 UTC 时间。
pub fn now_utc() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
