//! BACnet/IP 适配器
//!
//! 轮询路径对每个点位发送 ReadProperty(present-value)，按 invoke id 匹配应答。
//! Who-Is / I-Am 发现是独立操作，仅用于交互式浏览，不在轮询路径上。

pub mod codec;

use crate::adapter::{ProtocolAdapter, Target};
use crate::error::AdapterError;
use crate::types::{RawReading, RawValue};
use async_trait::async_trait;
use codec::{Apdu, ApplicationValue, PROPERTY_PRESENT_VALUE};
use domain::BacnetPoint;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

/// 发现操作的时间上限。
pub const MAX_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(25);

const MAX_DATAGRAM: usize = 1500;

pub struct BacnetAdapter {
    target: Target,
    device_id: u32,
    points: Vec<BacnetPoint>,
    timeout: Duration,
}

impl BacnetAdapter {
    pub fn new(target: Target, device_id: u32, points: Vec<BacnetPoint>, timeout: Duration) -> Self {
        Self {
            target,
            device_id,
            points,
            timeout,
        }
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

pub struct BacnetConnection {
    socket: UdpSocket,
    next_invoke_id: u8,
}

impl BacnetConnection {
    fn next_invoke_id(&mut self) -> u8 {
        let id = self.next_invoke_id;
        self.next_invoke_id = self.next_invoke_id.wrapping_add(1);
        id
    }
}

pub(crate) async fn bind_for(addr: &SocketAddr) -> Result<UdpSocket, AdapterError> {
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    UdpSocket::bind(local).await.map_err(AdapterError::from_io)
}

/// 点位读取结果。
enum PointOutcome {
    Value(ApplicationValue),
    Failed(String),
}

async fn read_one(
    conn: &mut BacnetConnection,
    point: &BacnetPoint,
    timeout: Duration,
) -> Result<PointOutcome, AdapterError> {
    let invoke_id = conn.next_invoke_id();
    let request = codec::encode_read_property(
        invoke_id,
        point.object_type.code(),
        point.instance,
        PROPERTY_PRESENT_VALUE,
    );
    conn.socket
        .send(&request)
        .await
        .map_err(AdapterError::from_io)?;

    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let len = match timeout_at(deadline, conn.socket.recv(&mut buf)).await {
            Ok(result) => result.map_err(AdapterError::from_io)?,
            Err(_) => {
                return Err(AdapterError::Timeout(format!(
                    "no response for {} within {:?}",
                    point.key(),
                    timeout
                )));
            }
        };
        let apdu = match codec::decode_frame(&buf[..len]) {
            Ok(apdu) => apdu,
            Err(err) => {
                debug!(target: "gateway.protocol", error = %err, "bacnet_frame_discarded");
                continue;
            }
        };
        if apdu.invoke_id() != Some(invoke_id) {
            continue;
        }
        return Ok(match apdu {
            Apdu::ReadPropertyAck { value, .. } => PointOutcome::Value(value),
            Apdu::Error { class, code, .. } => {
                PointOutcome::Failed(format!("error class {} code {}", class, code))
            }
            Apdu::Reject { reason, .. } => PointOutcome::Failed(format!("reject reason {}", reason)),
            Apdu::Abort { reason, .. } => PointOutcome::Failed(format!("abort reason {}", reason)),
            Apdu::IAm(_) | Apdu::Other => continue,
        });
    }
}

fn to_raw(value: ApplicationValue) -> RawValue {
    match value {
        ApplicationValue::Null => RawValue::Null,
        ApplicationValue::Boolean(v) => RawValue::Boolean(v),
        ApplicationValue::Unsigned(v) => RawValue::Unsigned(v),
        ApplicationValue::Signed(v) => RawValue::Signed(v),
        ApplicationValue::Real(v) => RawValue::Real(f64::from(v)),
        ApplicationValue::Double(v) => RawValue::Real(v),
        ApplicationValue::Enumerated(v) => RawValue::Enumerated(v),
        ApplicationValue::CharacterString(v) => RawValue::Text(v),
        ApplicationValue::OctetString(v) | ApplicationValue::BitString(v) => RawValue::Octets(v),
        ApplicationValue::Date([year, month, day, _]) => RawValue::Text(format!(
            "{:04}-{:02}-{:02}",
            1900 + u32::from(year),
            month,
            day
        )),
        ApplicationValue::Time([hour, minute, second, hundredths]) => RawValue::Text(format!(
            "{:02}:{:02}:{:02}.{:02}",
            hour, minute, second, hundredths
        )),
        ApplicationValue::ObjectIdentifier {
            object_type,
            instance,
        } => RawValue::Text(format!("{}:{}", object_type, instance)),
    }
}

#[async_trait]
impl ProtocolAdapter for BacnetAdapter {
    type Connection = BacnetConnection;

    async fn connect(&self) -> Result<Self::Connection, AdapterError> {
        let addr = self.target.resolve().await?;
        let socket = bind_for(&addr).await?;
        socket.connect(addr).await.map_err(AdapterError::from_io)?;
        Ok(BacnetConnection {
            socket,
            next_invoke_id: 1,
        })
    }

    async fn read_points(&self, conn: &mut Self::Connection) -> Result<RawReading, AdapterError> {
        let mut reading = RawReading::new();
        let mut failed = Vec::new();
        let mut last_failure = String::new();
        for point in &self.points {
            match read_one(conn, point, self.timeout).await? {
                PointOutcome::Value(value) => reading.push(point.key(), to_raw(value)),
                PointOutcome::Failed(reason) => {
                    warn!(
                        target: "gateway.protocol",
                        device_id = self.device_id,
                        point = %point.key(),
                        reason = %reason,
                        "bacnet_point_failed"
                    );
                    last_failure = reason;
                    failed.push(point.key());
                }
            }
        }
        if failed.is_empty() {
            Ok(reading)
        } else {
            Err(AdapterError::from_failed_points(
                failed,
                self.points.len(),
                &last_failure,
            ))
        }
    }

    async fn disconnect(&self, _conn: Self::Connection) {}
}

/// 发现到的 BACnet 设备。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub device_id: u32,
    pub address: SocketAddr,
    pub max_apdu: u32,
    pub segmentation: u8,
    pub vendor_id: u32,
}

/// 发送 Who-Is 并收集 I-Am 应答，直到超时（上限 25 秒）。
pub async fn discover(
    target: SocketAddr,
    timeout: Duration,
) -> Result<Vec<DiscoveredDevice>, AdapterError> {
    let timeout = timeout.min(MAX_DISCOVERY_TIMEOUT);
    let socket = bind_for(&target).await?;
    socket.set_broadcast(true).map_err(AdapterError::from_io)?;
    let broadcast = match target {
        SocketAddr::V4(v4) => v4.ip().is_broadcast() || v4.ip().octets()[3] == 255,
        SocketAddr::V6(_) => false,
    };
    let request = codec::encode_who_is(None, broadcast);
    socket
        .send_to(&request, target)
        .await
        .map_err(AdapterError::from_io)?;
    info!(target: "gateway.protocol", target = %target, timeout_ms = timeout.as_millis() as u64, "bacnet_who_is_sent");

    let deadline = Instant::now() + timeout;
    let mut found: BTreeMap<u32, DiscoveredDevice> = BTreeMap::new();
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(err)) => {
                warn!(target: "gateway.protocol", error = %err, "bacnet_discovery_recv_failed");
                break;
            }
            Err(_) => break,
        };
        if let Ok(Apdu::IAm(i_am)) = codec::decode_frame(&buf[..len]) {
            found.entry(i_am.device_id).or_insert(DiscoveredDevice {
                device_id: i_am.device_id,
                address: from,
                max_apdu: i_am.max_apdu,
                segmentation: i_am.segmentation,
                vendor_id: i_am.vendor_id,
            });
        }
    }
    info!(target: "gateway.protocol", count = found.len(), "bacnet_discovery_finished");
    Ok(found.into_values().collect())
}
