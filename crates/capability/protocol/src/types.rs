//! 协议层原始读数类型

/// 适配器返回的原始值，尚未标准化。
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Modbus 寄存器原始字
    Registers(Vec<u16>),
    Real(f64),
    Unsigned(u64),
    Signed(i64),
    Boolean(bool),
    /// BACnet 枚举值
    Enumerated(u32),
    Text(String),
    Octets(Vec<u8>),
    /// SNMP IpAddress
    IpAddress([u8; 4]),
    /// SNMP 对象标识
    ObjectId(String),
    Null,
}

/// 单个点位的原始读数。
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    pub key: String,
    pub value: RawValue,
}

/// 一次读取的全部原始点位（按配置顺序）。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReading {
    pub points: Vec<RawPoint>,
}

impl RawReading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: RawValue) {
        self.points.push(RawPoint {
            key: key.into(),
            value,
        });
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.points
            .iter()
            .find(|point| point.key == key)
            .map(|point| &point.value)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
