use domain::{
    AlarmRule, AlarmType, BacnetObjectType, Device, DeviceConfig, DeviceConfigError,
    HistoryLogger, LoggerError, ModbusDataType, PointValue, Protocol, ProtocolSettings,
    RegisterKind, SnmpVersion, WordOrder,
};
use serde_json::json;

fn parse_device(value: serde_json::Value) -> DeviceConfig {
    serde_json::from_value(value).expect("device config")
}

#[test]
fn modbus_device_accepts_bare_and_detailed_points() {
    let config = parse_device(json!({
        "id": "d1",
        "name": "Sensor",
        "protocol": "modbus",
        "host": "10.0.0.5",
        "unitId": 3,
        "points": [40001, "30002", {
            "address": 10,
            "function": "input",
            "dataType": "float32",
            "wordOrder": "little",
            "scale": 0.1
        }]
    }));

    assert_eq!(config.protocol(), Protocol::Modbus);
    assert_eq!(config.port(), 502);
    assert_eq!(config.poll_interval_ms, 5000);
    assert_eq!(config.timeout_ms, 3000);
    assert!(config.enabled);
    assert_eq!(
        config.point_keys(),
        vec!["register_40001", "register_30002", "register_10"]
    );
    let ProtocolSettings::Modbus { unit_id, points } = &config.settings else {
        panic!("expected modbus settings");
    };
    assert_eq!(*unit_id, 3);
    assert_eq!(points[1].resolve(), (RegisterKind::Input, 1));
    assert_eq!(points[2].data_type, ModbusDataType::Float32);
    assert_eq!(points[2].word_order, WordOrder::Little);
    assert_eq!(points[2].scale, 0.1);
    assert_eq!(points[2].resolve(), (RegisterKind::Input, 10));
    assert!(config.validate().is_ok());
}

#[test]
fn snmp_device_id_is_the_community() {
    let config = parse_device(json!({
        "id": "ups",
        "name": "UPS",
        "protocol": "snmp",
        "host": "10.0.0.9",
        "deviceId": "private",
        "version": "v1",
        "points": ["1.3.6.1.2.1.1.3.0", {"oid": "1.3.6.1.2.1.1.5.0"}]
    }));

    assert_eq!(config.port(), 161);
    let ProtocolSettings::Snmp {
        community, version, ..
    } = &config.settings
    else {
        panic!("expected snmp settings");
    };
    assert_eq!(community, "private");
    assert_eq!(*version, SnmpVersion::V1);
    assert_eq!(
        config.point_keys(),
        vec!["1.3.6.1.2.1.1.3.0", "1.3.6.1.2.1.1.5.0"]
    );
}

#[test]
fn bacnet_device_round_trips() {
    let config = parse_device(json!({
        "id": "ahu",
        "name": "AHU-1",
        "protocol": "bacnet",
        "host": "10.0.0.20",
        "deviceId": 1201,
        "pollInterval": 10000,
        "points": [{"objectType": "analog-input", "instance": 1}]
    }));
    assert_eq!(config.port(), 47808);
    assert_eq!(config.point_keys(), vec!["analog-input_1"]);

    let encoded = serde_json::to_value(&config).expect("encode");
    assert_eq!(encoded["protocol"], "bacnet");
    assert_eq!(encoded["deviceId"], 1201);
    assert_eq!(encoded["pollInterval"], 10000);
    assert_eq!(encoded["points"][0]["objectType"], "analog-input");
    let decoded: DeviceConfig = serde_json::from_value(encoded).expect("decode");
    assert_eq!(decoded, config);
    let ProtocolSettings::Bacnet { points, .. } = &decoded.settings else {
        panic!("expected bacnet settings");
    };
    assert_eq!(points[0].object_type, BacnetObjectType::AnalogInput);
}

#[test]
fn invalid_device_config_is_rejected() {
    let mut config = parse_device(json!({
        "id": "d1",
        "name": "Sensor",
        "protocol": "modbus",
        "host": "",
        "points": [40001]
    }));
    assert_eq!(config.validate(), Err(DeviceConfigError::Missing("host")));

    config.host = "10.0.0.5".to_string();
    config.settings = ProtocolSettings::Modbus {
        unit_id: 1,
        points: Vec::new(),
    };
    assert_eq!(config.validate(), Err(DeviceConfigError::Missing("points")));

    let unknown = serde_json::from_value::<DeviceConfig>(json!({
        "id": "d2",
        "name": "X",
        "protocol": "opcua",
        "host": "10.0.0.5",
        "points": []
    }));
    assert!(unknown.is_err());
}

#[test]
fn device_snapshot_serializes_live_fields() {
    let config = parse_device(json!({
        "id": "d1",
        "name": "Sensor",
        "protocol": "modbus",
        "host": "10.0.0.5",
        "points": [40001]
    }));
    let mut device = Device::new(config);
    device
        .last_data
        .insert("register_40001".to_string(), PointValue::Number(25.6));

    let encoded = serde_json::to_value(&device).expect("encode");
    assert_eq!(encoded["id"], "d1");
    assert_eq!(encoded["status"], "offline");
    assert_eq!(encoded["lastData"]["register_40001"], 25.6);
    assert_eq!(encoded["consecutiveFailures"], 0);
    assert!(encoded["lastUpdated"].is_null());
}

#[test]
fn alarm_rule_wire_defaults() {
    let rule: AlarmRule = serde_json::from_value(json!({
        "id": "r1",
        "deviceId": "d1",
        "dataKey": "temperature",
        "type": "threshold",
        "operator": "gt",
        "value": 30
    }))
    .expect("rule");

    assert_eq!(rule.alarm_type, AlarmType::Threshold);
    assert_eq!(rule.cooldown_period_ms, 300_000);
    assert!(rule.enabled);
    assert_eq!(rule.trigger_count, 0);
    assert!(rule.validate().is_ok());
}

#[test]
fn history_logger_validation() {
    let logger: HistoryLogger = serde_json::from_value(json!({
        "id": "h1",
        "deviceId": "d1",
        "dataPoints": ["temperature", "humidity"],
        "interval": 60000,
        "retentionDays": 7
    }))
    .expect("logger");
    assert!(logger.validate().is_ok());

    let mut latest = domain::DeviceData::new();
    latest.insert("temperature".to_string(), PointValue::Number(21.0));
    latest.insert("pressure".to_string(), PointValue::Number(1.0));
    let projected = logger.project(&latest);
    assert_eq!(projected.len(), 1);
    assert!(projected.contains_key("temperature"));

    let mut empty = logger.clone();
    empty.data_points.clear();
    assert!(matches!(
        empty.validate(),
        Err(LoggerError::Missing {
            field: "dataPoints",
            ..
        })
    ));

    let mut zero = logger.clone();
    zero.retention_days = 0;
    assert!(matches!(zero.validate(), Err(LoggerError::Invalid { .. })));

    let mut longest = logger.clone();
    longest.retention_days = domain::MAX_RETENTION_DAYS;
    assert!(longest.validate().is_ok());
    let mut unbounded = logger;
    unbounded.retention_days = 4_000_000_000;
    assert!(matches!(
        unbounded.validate(),
        Err(LoggerError::Invalid { .. })
    ));
}
