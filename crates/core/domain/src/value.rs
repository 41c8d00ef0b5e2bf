use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 规范化后的点位值（数值或字符串）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    Number(f64),
    Text(String),
}

impl PointValue {
    /// 数值视图；字符串能解析为数值时同样返回。
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::Number(v) => Some(*v),
            PointValue::Text(v) => v.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointValue::Number(v) => write!(f, "{}", v),
            PointValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<f64> for PointValue {
    fn from(value: f64) -> Self {
        PointValue::Number(value)
    }
}

impl From<&str> for PointValue {
    fn from(value: &str) -> Self {
        PointValue::Text(value.to_string())
    }
}

impl From<String> for PointValue {
    fn from(value: String) -> Self {
        PointValue::Text(value)
    }
}

/// 单个设备的一次读数：点位键 -> 值。
pub type DeviceData = BTreeMap<String, PointValue>;
