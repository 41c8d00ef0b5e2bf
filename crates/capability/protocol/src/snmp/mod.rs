//! SNMP v1/v2c 适配器
//!
//! 设备的 deviceId 字段即 community。一次 GetRequest 读取全部 OID；
//! v2c 的 noSuchObject / noSuchInstance / endOfMibView 按点位失败处理，
//! v1 的 noSuchName 会剔除出错 OID 后重新请求其余 OID。

pub mod ber;

use crate::adapter::{ProtocolAdapter, Target};
use crate::bacnet::bind_for;
use crate::error::AdapterError;
use crate::types::{RawReading, RawValue};
use async_trait::async_trait;
use ber::{Message, PDU_GET_RESPONSE, SnmpValue};
use domain::{SnmpPoint, SnmpVersion};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

const MAX_DATAGRAM: usize = 65_507;
const ERROR_NO_SUCH_NAME: u32 = 2;

pub struct SnmpAdapter {
    target: Target,
    community: String,
    version: SnmpVersion,
    points: Vec<SnmpPoint>,
    timeout: Duration,
}

impl SnmpAdapter {
    pub fn new(
        target: Target,
        community: String,
        version: SnmpVersion,
        points: Vec<SnmpPoint>,
        timeout: Duration,
    ) -> Self {
        Self {
            target,
            community,
            version,
            points,
            timeout,
        }
    }

    fn version_number(&self) -> i64 {
        match self.version {
            SnmpVersion::V1 => 0,
            SnmpVersion::V2c => 1,
        }
    }
}

pub struct SnmpConnection {
    socket: UdpSocket,
    next_request_id: i32,
}

impl SnmpConnection {
    fn next_request_id(&mut self) -> i32 {
        let id = self.next_request_id;
        self.next_request_id = if id == i32::MAX { 1 } else { id + 1 };
        id
    }
}

fn error_status_name(status: u32) -> &'static str {
    match status {
        1 => "tooBig",
        2 => "noSuchName",
        3 => "badValue",
        4 => "readOnly",
        5 => "genErr",
        6 => "noAccess",
        _ => "error",
    }
}

fn to_raw(value: SnmpValue) -> RawValue {
    match value {
        SnmpValue::Integer(v) => RawValue::Signed(v),
        SnmpValue::OctetString(v) | SnmpValue::Opaque(v) => RawValue::Octets(v),
        SnmpValue::Null => RawValue::Null,
        SnmpValue::ObjectId(v) => RawValue::ObjectId(v),
        SnmpValue::IpAddress(v) => RawValue::IpAddress(v),
        SnmpValue::Counter32(v) | SnmpValue::Gauge32(v) | SnmpValue::TimeTicks(v) => {
            RawValue::Unsigned(u64::from(v))
        }
        SnmpValue::Counter64(v) => RawValue::Unsigned(v),
        // 异常值在调用方已被过滤
        SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView => {
            RawValue::Null
        }
    }
}

impl SnmpAdapter {
    async fn get(
        &self,
        conn: &mut SnmpConnection,
        oids: &[&str],
    ) -> Result<Message, AdapterError> {
        let request_id = conn.next_request_id();
        let request = ber::encode_get_request(self.version_number(), &self.community, request_id, oids)
            .map_err(|err| AdapterError::InvalidConfig(err.to_string()))?;
        conn.socket
            .send(&request)
            .await
            .map_err(AdapterError::from_io)?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let len = match timeout_at(deadline, conn.socket.recv(&mut buf)).await {
                Ok(result) => result.map_err(AdapterError::from_io)?,
                Err(_) => {
                    return Err(AdapterError::Timeout(format!(
                        "no snmp response from {} within {:?}",
                        self.target, self.timeout
                    )));
                }
            };
            match ber::decode_message(&buf[..len]) {
                Ok(message)
                    if message.pdu.tag == PDU_GET_RESPONSE
                        && message.pdu.request_id == request_id =>
                {
                    return Ok(message);
                }
                Ok(message) => {
                    debug!(
                        target: "gateway.protocol",
                        request_id = message.pdu.request_id,
                        expected = request_id,
                        "snmp_response_discarded"
                    );
                }
                Err(err) => {
                    debug!(target: "gateway.protocol", error = %err, "snmp_response_discarded");
                }
            }
        }
    }
}

#[async_trait]
impl ProtocolAdapter for SnmpAdapter {
    type Connection = SnmpConnection;

    async fn connect(&self) -> Result<Self::Connection, AdapterError> {
        let addr = self.target.resolve().await?;
        let socket = bind_for(&addr).await?;
        socket.connect(addr).await.map_err(AdapterError::from_io)?;
        Ok(SnmpConnection {
            socket,
            next_request_id: 1,
        })
    }

    async fn read_points(&self, conn: &mut Self::Connection) -> Result<RawReading, AdapterError> {
        let mut pending: Vec<&str> = self.points.iter().map(|p| p.oid.as_str()).collect();
        let mut values: Vec<(String, SnmpValue)> = Vec::new();
        let mut failed: Vec<String> = Vec::new();

        while !pending.is_empty() {
            let response = self.get(conn, &pending).await?;
            let pdu = response.pdu;
            if pdu.error_status == ERROR_NO_SUCH_NAME {
                let index = pdu.error_index as usize;
                if index == 0 || index > pending.len() {
                    return Err(AdapterError::Protocol(format!(
                        "noSuchName with invalid error-index {}",
                        pdu.error_index
                    )));
                }
                failed.push(pending.remove(index - 1).to_string());
                continue;
            }
            if pdu.error_status != 0 {
                return Err(AdapterError::Protocol(format!(
                    "agent returned {} (index {})",
                    error_status_name(pdu.error_status),
                    pdu.error_index
                )));
            }
            for oid in &pending {
                let bound = pdu
                    .varbinds
                    .iter()
                    .find(|vb| vb.oid == oid.trim_start_matches('.'))
                    .map(|vb| vb.value.clone());
                match bound {
                    Some(value) if !value.is_exception() => values.push((oid.to_string(), value)),
                    Some(value) => {
                        debug!(target: "gateway.protocol", oid = %oid, value = ?value, "snmp_oid_missing");
                        failed.push(oid.to_string());
                    }
                    None => failed.push(oid.to_string()),
                }
            }
            pending.clear();
        }

        if !failed.is_empty() {
            warn!(
                target: "gateway.protocol",
                target_addr = %self.target,
                failed = failed.len(),
                "snmp_points_failed"
            );
            return Err(AdapterError::from_failed_points(
                failed,
                self.points.len(),
                "no such object",
            ));
        }

        let mut reading = RawReading::new();
        for point in &self.points {
            if let Some((_, value)) = values.iter().find(|(oid, _)| *oid == point.oid) {
                reading.push(point.key(), to_raw(value.clone()));
            }
        }
        Ok(reading)
    }

    async fn disconnect(&self, _conn: Self::Connection) {}
}
