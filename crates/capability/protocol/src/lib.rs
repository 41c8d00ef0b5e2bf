//! # 协议适配能力模块
//!
//! 提供多协议点位读取能力，支持：
//! - **Modbus TCP**：保持/输入寄存器（tokio-modbus）
//! - **BACnet/IP**：ReadProperty(present-value)，Who-Is/I-Am 发现
//! - **SNMP v1/v2c**：GetRequest
//!
//! ## 架构设计
//!
//! ```text
//! DeviceConfig (protocol + points)
//!       │
//!       ▼
//! DeviceAdapter::from_config  ── InvalidConfig
//!       │
//!       ├── Session<ModbusAdapter>
//!       ├── Session<BacnetAdapter>
//!       └── Session<SnmpAdapter>
//!       │
//!       ▼
//! PointReader::read → RawReading | AdapterError
//! ```

mod adapter;
pub mod bacnet;
mod error;
mod modbus_tcp;
pub mod snmp;
mod types;

pub use adapter::{DeviceAdapter, PointReader, ProtocolAdapter, Session, Target};
pub use bacnet::{BacnetAdapter, DiscoveredDevice, discover};
pub use error::AdapterError;
pub use modbus_tcp::ModbusAdapter;
pub use snmp::SnmpAdapter;
pub use types::{RawPoint, RawReading, RawValue};
