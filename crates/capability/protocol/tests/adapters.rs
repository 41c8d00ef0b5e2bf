use domain::DeviceConfig;
use gateway_protocol::snmp::ber::{self, Message, Pdu, SnmpValue, VarBind};
use gateway_protocol::{AdapterError, DeviceAdapter, PointReader, RawValue};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

fn device(value: serde_json::Value) -> DeviceConfig {
    serde_json::from_value(value).expect("device config")
}

/// 最小 Modbus TCP 从站：地址 0 起为保持寄存器，地址 >= 100 返回非法地址异常。
async fn spawn_modbus_slave() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut header = [0u8; 7];
                while stream.read_exact(&mut header).await.is_ok() {
                    let len = u16::from_be_bytes([header[4], header[5]]) as usize;
                    let mut pdu = vec![0u8; len - 1];
                    if stream.read_exact(&mut pdu).await.is_err() {
                        return;
                    }
                    let function = pdu[0];
                    let start = u16::from_be_bytes([pdu[1], pdu[2]]);
                    let count = u16::from_be_bytes([pdu[3], pdu[4]]);
                    let mut body = Vec::new();
                    if start >= 100 {
                        body.push(function | 0x80);
                        body.push(0x02);
                    } else {
                        body.push(function);
                        body.push((count * 2) as u8);
                        for offset in 0..count {
                            let value = 256u16 + start + offset;
                            body.extend_from_slice(&value.to_be_bytes());
                        }
                    }
                    let mut response = Vec::new();
                    response.extend_from_slice(&header[0..4]);
                    response.extend_from_slice(&((body.len() + 1) as u16).to_be_bytes());
                    response.push(header[6]);
                    response.extend_from_slice(&body);
                    if stream.write_all(&response).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    port
}

#[tokio::test]
async fn modbus_reads_holding_registers() {
    let port = spawn_modbus_slave().await;
    let adapter = DeviceAdapter::from_config(&device(json!({
        "id": "d1",
        "name": "Sensor",
        "protocol": "modbus",
        "host": "127.0.0.1",
        "port": port,
        "points": [40001, {"address": 5, "dataType": "uint32"}]
    })))
    .expect("adapter");

    let reading = adapter.read().await.expect("read");
    assert_eq!(
        reading.get("register_40001"),
        Some(&RawValue::Registers(vec![256]))
    );
    assert_eq!(
        reading.get("register_5"),
        Some(&RawValue::Registers(vec![261, 262]))
    );

    // 缓存的连接可以复用
    let again = adapter.read().await.expect("second read");
    assert_eq!(again.len(), 2);
    adapter.close().await;
}

#[tokio::test]
async fn modbus_exception_on_some_points_is_partial_read() {
    let port = spawn_modbus_slave().await;
    let adapter = DeviceAdapter::from_config(&device(json!({
        "id": "d1",
        "name": "Sensor",
        "protocol": "modbus",
        "host": "127.0.0.1",
        "port": port,
        "points": [40001, 40200]
    })))
    .expect("adapter");

    match adapter.read().await {
        Err(AdapterError::PartialRead { missing, total }) => {
            assert_eq!(missing, vec!["register_40200".to_string()]);
            assert_eq!(total, 2);
        }
        other => panic!("expected partial read, got {:?}", other),
    }
}

#[tokio::test]
async fn modbus_refused_connection_is_typed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    let adapter = DeviceAdapter::from_config(&device(json!({
        "id": "d1",
        "name": "Sensor",
        "protocol": "modbus",
        "host": "127.0.0.1",
        "port": port,
        "points": [40001]
    })))
    .expect("adapter");

    let err = adapter.read().await.expect_err("refused");
    assert!(matches!(err, AdapterError::ConnectionRefused(_)), "{:?}", err);
    assert!(err.is_transient());
}

#[test]
fn invalid_config_is_rejected_at_creation() {
    let result = DeviceAdapter::from_config(&device(json!({
        "id": "d1",
        "name": "Sensor",
        "protocol": "snmp",
        "host": "127.0.0.1",
        "points": ["not-an-oid"]
    })));
    assert!(matches!(result, Err(AdapterError::InvalidConfig(_))));
}

/// BACnet 设备：对 analog-input 返回 REAL，对 binary-input 返回 Error PDU。
async fn spawn_bacnet_device() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let port = socket.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        while let Ok((len, from)) = socket.recv_from(&mut buf).await {
            let request = &buf[..len];
            let invoke_id = request[8];
            let object_type = u32::from_be_bytes([request[11], request[12], request[13], request[14]]) >> 22;
            let apdu: Vec<u8> = if object_type == 0 {
                vec![
                    0x30, invoke_id, 0x0C, 0x0C, 0x00, 0x00, 0x00, 0x01, 0x19, 0x55, 0x3E, 0x44,
                    0x41, 0xCC, 0xCC, 0xCD, 0x3F,
                ]
            } else {
                vec![0x50, invoke_id, 0x0C, 0x91, 0x01, 0x91, 0x1F]
            };
            // 先发一个 invoke id 不匹配的干扰应答
            let mut stray = vec![0x81, 0x0A, 0x00, 0x00, 0x01, 0x00];
            stray.extend_from_slice(&[0x50, invoke_id.wrapping_add(100), 0x0C, 0x91, 0x01, 0x91, 0x1F]);
            let stray_len = stray.len() as u16;
            stray[2..4].copy_from_slice(&stray_len.to_be_bytes());
            let _ = socket.send_to(&stray, from).await;

            let mut frame = vec![0x81, 0x0A, 0x00, 0x00, 0x01, 0x00];
            frame.extend_from_slice(&apdu);
            let frame_len = frame.len() as u16;
            frame[2..4].copy_from_slice(&frame_len.to_be_bytes());
            let _ = socket.send_to(&frame, from).await;
        }
    });
    port
}

#[tokio::test]
async fn bacnet_reads_present_value() {
    let port = spawn_bacnet_device().await;
    let adapter = DeviceAdapter::from_config(&device(json!({
        "id": "ahu",
        "name": "AHU",
        "protocol": "bacnet",
        "host": "127.0.0.1",
        "port": port,
        "deviceId": 1201,
        "timeout": 1000,
        "points": [{"objectType": "analog-input", "instance": 1}]
    })))
    .expect("adapter");

    let reading = adapter.read().await.expect("read");
    assert_eq!(
        reading.get("analog-input_1"),
        Some(&RawValue::Real(f64::from(25.6f32)))
    );
}

#[tokio::test]
async fn bacnet_error_pdu_fails_the_point() {
    let port = spawn_bacnet_device().await;
    let adapter = DeviceAdapter::from_config(&device(json!({
        "id": "ahu",
        "name": "AHU",
        "protocol": "bacnet",
        "host": "127.0.0.1",
        "port": port,
        "deviceId": 1201,
        "timeout": 1000,
        "points": [
            {"objectType": "analog-input", "instance": 1},
            {"objectType": "binary-input", "instance": 2}
        ]
    })))
    .expect("adapter");

    match adapter.read().await {
        Err(AdapterError::PartialRead { missing, .. }) => {
            assert_eq!(missing, vec!["binary-input_2".to_string()]);
        }
        other => panic!("expected partial read, got {:?}", other),
    }
}

#[tokio::test]
async fn bacnet_silent_device_times_out() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let port = silent.local_addr().expect("addr").port();
    let adapter = DeviceAdapter::from_config(&device(json!({
        "id": "ahu",
        "name": "AHU",
        "protocol": "bacnet",
        "host": "127.0.0.1",
        "port": port,
        "deviceId": 1,
        "timeout": 100,
        "points": [{"objectType": "analog-value", "instance": 3}]
    })))
    .expect("adapter");

    let err = adapter.read().await.expect_err("timeout");
    assert!(matches!(err, AdapterError::Timeout(_)), "{:?}", err);
    drop(silent);
}

/// SNMP 代理：sysUpTime 返回 TimeTicks，sysName 返回字符串，其余 noSuchInstance。
async fn spawn_snmp_agent() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let port = socket.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        while let Ok((len, from)) = socket.recv_from(&mut buf).await {
            let Ok(request) = ber::decode_message(&buf[..len]) else {
                continue;
            };
            let varbinds = request
                .pdu
                .varbinds
                .iter()
                .map(|vb| VarBind {
                    oid: vb.oid.clone(),
                    value: match vb.oid.as_str() {
                        "1.3.6.1.2.1.1.3.0" => SnmpValue::TimeTicks(123_456),
                        "1.3.6.1.2.1.1.5.0" => SnmpValue::OctetString(b"ups-1".to_vec()),
                        _ => SnmpValue::NoSuchInstance,
                    },
                })
                .collect();
            let response = Message {
                version: request.version,
                community: request.community.clone(),
                pdu: Pdu {
                    tag: ber::PDU_GET_RESPONSE,
                    request_id: request.pdu.request_id,
                    error_status: 0,
                    error_index: 0,
                    varbinds,
                },
            };
            let bytes = ber::encode_message(&response).expect("encode");
            let _ = socket.send_to(&bytes, from).await;
        }
    });
    port
}

#[tokio::test]
async fn snmp_get_reads_each_oid() {
    let port = spawn_snmp_agent().await;
    let adapter = DeviceAdapter::from_config(&device(json!({
        "id": "ups",
        "name": "UPS",
        "protocol": "snmp",
        "host": "127.0.0.1",
        "port": port,
        "timeout": 1000,
        "points": ["1.3.6.1.2.1.1.3.0", "1.3.6.1.2.1.1.5.0"]
    })))
    .expect("adapter");

    let reading = adapter.read().await.expect("read");
    assert_eq!(
        reading.get("1.3.6.1.2.1.1.3.0"),
        Some(&RawValue::Unsigned(123_456))
    );
    assert_eq!(
        reading.get("1.3.6.1.2.1.1.5.0"),
        Some(&RawValue::Octets(b"ups-1".to_vec()))
    );
}

#[tokio::test]
async fn snmp_missing_oids() {
    let port = spawn_snmp_agent().await;
    let partial = DeviceAdapter::from_config(&device(json!({
        "id": "ups",
        "name": "UPS",
        "protocol": "snmp",
        "host": "127.0.0.1",
        "port": port,
        "timeout": 1000,
        "points": ["1.3.6.1.2.1.1.3.0", "1.3.6.1.2.1.1.9.0"]
    })))
    .expect("adapter");
    assert!(matches!(
        partial.read().await,
        Err(AdapterError::PartialRead { .. })
    ));

    let all_missing = DeviceAdapter::from_config(&device(json!({
        "id": "ups2",
        "name": "UPS",
        "protocol": "snmp",
        "host": "127.0.0.1",
        "port": port,
        "timeout": 1000,
        "points": ["1.3.6.1.2.1.1.9.0"]
    })))
    .expect("adapter");
    assert!(matches!(
        all_missing.read().await,
        Err(AdapterError::Protocol(_))
    ));
}
