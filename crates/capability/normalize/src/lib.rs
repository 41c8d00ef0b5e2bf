//! 原始读数 -> 设备点位映射的规范化。
//!
//! Modbus 寄存器按点位的数据类型、字序解码后应用 scale/offset；
//! BACnet 与 SNMP 的应用层值转换为数值或字符串。
//! 非有限数值（NaN / Inf）被丢弃，不进入 lastData。

use domain::{DeviceData, ModbusDataType, ModbusPoint, PointValue, ProtocolSettings, WordOrder};
use gateway_protocol::{RawReading, RawValue};
use tracing::warn;

/// 规范化错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("invalid payload for {key}: {reason}")]
    InvalidPayload { key: String, reason: String },
}

/// RawReading -> DeviceData 的规范化实现。
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(
        &self,
        settings: &ProtocolSettings,
        reading: &RawReading,
    ) -> Result<DeviceData, NormalizeError> {
        let mut data = DeviceData::new();
        match settings {
            ProtocolSettings::Modbus { points, .. } => {
                for point in points {
                    let key = point.key();
                    let Some(raw) = reading.get(&key) else {
                        continue;
                    };
                    let RawValue::Registers(words) = raw else {
                        return Err(invalid(&key, "expected register words"));
                    };
                    let value = decode_point(point, words).map_err(|reason| invalid(&key, &reason))?;
                    insert_number(&mut data, key, value);
                }
            }
            ProtocolSettings::Bacnet { .. } | ProtocolSettings::Snmp { .. } => {
                let keys = settings.point_keys();
                for key in keys {
                    let Some(raw) = reading.get(&key) else {
                        continue;
                    };
                    if let Some(value) = convert_value(raw) {
                        match value {
                            PointValue::Number(number) => insert_number(&mut data, key, number),
                            text => {
                                data.insert(key, text);
                            }
                        }
                    }
                }
            }
        }
        Ok(data)
    }
}

fn invalid(key: &str, reason: &str) -> NormalizeError {
    NormalizeError::InvalidPayload {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn insert_number(data: &mut DeviceData, key: String, value: f64) {
    if value.is_finite() {
        data.insert(key, PointValue::Number(value));
    } else {
        warn!(target: "gateway.normalize", key = %key, "non_finite_value_dropped");
    }
}

/// 解码单个 Modbus 点位并应用缩放与偏移。
pub fn decode_point(point: &ModbusPoint, words: &[u16]) -> Result<f64, String> {
    let raw = parse_registers(words, point.data_type, point.word_order)?;
    Ok(raw * point.scale + point.offset)
}

/// 解析寄存器数据为浮点值。
pub fn parse_registers(
    registers: &[u16],
    data_type: ModbusDataType,
    word_order: WordOrder,
) -> Result<f64, String> {
    let needed = usize::from(data_type.register_count());
    if registers.len() < needed {
        return Err(format!(
            "need {} registers for {:?}, got {}",
            needed,
            data_type,
            registers.len()
        ));
    }
    let mut words: Vec<u16> = registers[..needed].to_vec();
    if word_order == WordOrder::Little {
        words.reverse();
    }
    let combined = words
        .iter()
        .fold(0u64, |acc, word| (acc << 16) | u64::from(*word));

    let value = match data_type {
        ModbusDataType::Int16 => f64::from(words[0] as i16),
        ModbusDataType::Uint16 => f64::from(words[0]),
        ModbusDataType::Int32 => f64::from(combined as u32 as i32),
        ModbusDataType::Uint32 => f64::from(combined as u32),
        ModbusDataType::Float32 => f64::from(f32::from_bits(combined as u32)),
        ModbusDataType::Float64 => f64::from_bits(combined),
    };
    Ok(value)
}

/// BACnet / SNMP 值转换；Null 返回 None。
pub fn convert_value(raw: &RawValue) -> Option<PointValue> {
    match raw {
        RawValue::Real(v) => Some(PointValue::Number(*v)),
        RawValue::Unsigned(v) => Some(PointValue::Number(*v as f64)),
        RawValue::Signed(v) => Some(PointValue::Number(*v as f64)),
        RawValue::Boolean(v) => Some(PointValue::Number(if *v { 1.0 } else { 0.0 })),
        RawValue::Enumerated(v) => Some(PointValue::Number(f64::from(*v))),
        RawValue::Text(v) => Some(PointValue::Text(v.clone())),
        RawValue::Octets(bytes) => Some(PointValue::Text(octets_to_text(bytes))),
        RawValue::IpAddress([a, b, c, d]) => Some(PointValue::Text(format!("{}.{}.{}.{}", a, b, c, d))),
        RawValue::ObjectId(oid) => Some(PointValue::Text(oid.clone())),
        RawValue::Registers(words) if words.len() == 1 => Some(PointValue::Number(f64::from(words[0]))),
        RawValue::Registers(_) | RawValue::Null => None,
    }
}

/// 可打印的 UTF-8 原样返回，否则以十六进制表示。
fn octets_to_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if text.chars().all(|c| !c.is_control() || c == '\n' || c == '\r' || c == '\t') => {
            text.to_string()
        }
        _ => bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_int16_sign() {
        assert_eq!(
            parse_registers(&[100], ModbusDataType::Int16, WordOrder::Big),
            Ok(100.0)
        );
        assert_eq!(
            parse_registers(&[(-100i16) as u16], ModbusDataType::Int16, WordOrder::Big),
            Ok(-100.0)
        );
        assert_eq!(
            parse_registers(&[(-100i16) as u16], ModbusDataType::Uint16, WordOrder::Big),
            Ok(65436.0)
        );
    }

    #[test]
    fn parse_32_bit_word_orders() {
        let bits = 25.5f32.to_bits();
        let high = (bits >> 16) as u16;
        let low = bits as u16;
        assert_eq!(
            parse_registers(&[high, low], ModbusDataType::Float32, WordOrder::Big),
            Ok(25.5)
        );
        assert_eq!(
            parse_registers(&[low, high], ModbusDataType::Float32, WordOrder::Little),
            Ok(25.5)
        );
        assert_eq!(
            parse_registers(&[0xFFFF, 0xFFFE], ModbusDataType::Int32, WordOrder::Big),
            Ok(-2.0)
        );
        assert_eq!(
            parse_registers(&[0x0001, 0x0000], ModbusDataType::Uint32, WordOrder::Big),
            Ok(65536.0)
        );
    }

    #[test]
    fn parse_float64_and_short_input() {
        let bits = 1234.5678f64.to_bits();
        let words = [
            (bits >> 48) as u16,
            (bits >> 32) as u16,
            (bits >> 16) as u16,
            bits as u16,
        ];
        assert_eq!(
            parse_registers(&words, ModbusDataType::Float64, WordOrder::Big),
            Ok(1234.5678)
        );
        assert!(parse_registers(&words[..2], ModbusDataType::Float64, WordOrder::Big).is_err());
    }

    #[test]
    fn octets_render_as_text_or_hex() {
        assert_eq!(octets_to_text(b"ups-1"), "ups-1");
        assert_eq!(octets_to_text(&[0x00, 0x1a, 0xff]), "00:1a:ff");
    }
}
