use domain::{
    BacnetObjectType, BacnetPoint, ModbusDataType, ModbusPoint, PointValue, ProtocolSettings,
    SnmpPoint, SnmpVersion, WordOrder,
};
use gateway_normalize::{NormalizeError, Normalizer};
use gateway_protocol::{RawReading, RawValue};
use proptest::prelude::*;

fn modbus(points: Vec<ModbusPoint>) -> ProtocolSettings {
    ProtocolSettings::Modbus { unit_id: 1, points }
}

#[test]
fn modbus_applies_scale_and_offset() {
    let mut scaled = ModbusPoint::new(40002);
    scaled.data_type = ModbusDataType::Int16;
    scaled.scale = 0.1;
    scaled.offset = -40.0;
    let settings = modbus(vec![ModbusPoint::new(40001), scaled]);

    let mut reading = RawReading::new();
    reading.push("register_40001", RawValue::Registers(vec![256]));
    reading.push("register_40002", RawValue::Registers(vec![656]));

    let data = Normalizer::new().normalize(&settings, &reading).expect("normalize");
    assert_eq!(data.get("register_40001"), Some(&PointValue::Number(256.0)));
    let value = data
        .get("register_40002")
        .and_then(PointValue::as_f64)
        .expect("scaled value");
    assert!((value - 25.6).abs() < 1e-9);
}

#[test]
fn modbus_drops_nan_and_rejects_short_words() {
    let mut float = ModbusPoint::new(1);
    float.data_type = ModbusDataType::Float32;
    float.word_order = WordOrder::Big;
    let settings = modbus(vec![float]);

    let mut nan = RawReading::new();
    let bits = f32::NAN.to_bits();
    nan.push(
        "register_1",
        RawValue::Registers(vec![(bits >> 16) as u16, bits as u16]),
    );
    let data = Normalizer::new().normalize(&settings, &nan).expect("normalize");
    assert!(data.is_empty());

    let mut short = RawReading::new();
    short.push("register_1", RawValue::Registers(vec![1]));
    assert!(matches!(
        Normalizer::new().normalize(&settings, &short),
        Err(NormalizeError::InvalidPayload { .. })
    ));
}

#[test]
fn bacnet_and_snmp_values() {
    let bacnet = ProtocolSettings::Bacnet {
        device_id: 1,
        points: vec![
            BacnetPoint {
                object_type: BacnetObjectType::BinaryInput,
                instance: 1,
            },
            BacnetPoint {
                object_type: BacnetObjectType::MultiStateValue,
                instance: 2,
            },
        ],
    };
    let mut reading = RawReading::new();
    reading.push("binary-input_1", RawValue::Boolean(true));
    reading.push("multi-state-value_2", RawValue::Unsigned(3));
    let data = Normalizer::new().normalize(&bacnet, &reading).expect("normalize");
    assert_eq!(data.get("binary-input_1"), Some(&PointValue::Number(1.0)));
    assert_eq!(data.get("multi-state-value_2"), Some(&PointValue::Number(3.0)));

    let snmp = ProtocolSettings::Snmp {
        community: "public".to_string(),
        version: SnmpVersion::V2c,
        points: vec![
            SnmpPoint::new("1.3.6.1.2.1.1.5.0"),
            SnmpPoint::new("1.3.6.1.2.1.4.20.1.1.0"),
        ],
    };
    let mut reading = RawReading::new();
    reading.push("1.3.6.1.2.1.1.5.0", RawValue::Octets(b"ups-1".to_vec()));
    reading.push("1.3.6.1.2.1.4.20.1.1.0", RawValue::IpAddress([10, 0, 0, 9]));
    reading.push("1.3.6.1.2.1.99", RawValue::Unsigned(1));
    let data = Normalizer::new().normalize(&snmp, &reading).expect("normalize");
    assert_eq!(data.len(), 2);
    assert_eq!(data.get("1.3.6.1.2.1.1.5.0"), Some(&PointValue::from("ups-1")));
    assert_eq!(
        data.get("1.3.6.1.2.1.4.20.1.1.0"),
        Some(&PointValue::from("10.0.0.9"))
    );
}

proptest! {
    #[test]
    fn uint16_scale_offset_is_linear(word in any::<u16>(), scale in -100.0f64..100.0, offset in -1000.0f64..1000.0) {
        let mut point = ModbusPoint::new(40001);
        point.scale = scale;
        point.offset = offset;
        let value = gateway_normalize::decode_point(&point, &[word]).expect("decode");
        prop_assert!((value - (f64::from(word) * scale + offset)).abs() < 1e-9);
    }
}
