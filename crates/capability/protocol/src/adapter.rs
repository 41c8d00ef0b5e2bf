//! 适配器抽象与按设备缓存的会话
//!
//! 每种协议实现 `ProtocolAdapter`（connect / read_points / disconnect）。
//! 设备创建时根据协议一次性构造出 `DeviceAdapter`，轮询路径只依赖
//! `PointReader` 这一个能力：读取一组点位，返回原始值或类型化错误。

use crate::bacnet::BacnetAdapter;
use crate::error::AdapterError;
use crate::modbus_tcp::ModbusAdapter;
use crate::snmp::SnmpAdapter;
use crate::types::RawReading;
use async_trait::async_trait;
use domain::{DeviceConfig, ProtocolSettings};
use std::net::SocketAddr;
use tokio::sync::Mutex;
use tracing::debug;

/// 协议适配器
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    type Connection: Send;

    async fn connect(&self) -> Result<Self::Connection, AdapterError>;

    async fn read_points(&self, conn: &mut Self::Connection) -> Result<RawReading, AdapterError>;

    async fn disconnect(&self, conn: Self::Connection);
}

/// 轮询调度器依赖的读点能力。
#[async_trait]
pub trait PointReader: Send + Sync {
    async fn read(&self) -> Result<RawReading, AdapterError>;

    /// 释放缓存的连接（设备删除或替换时调用）。
    async fn close(&self);
}

/// 单设备会话：缓存连接，失败时丢弃以便下次重连。
///
/// 读取期间连接从槽位中取出，读取成功后再放回；
/// 如果调用方超时取消了 future，连接随之释放，不会留下半完成的事务。
pub struct Session<A: ProtocolAdapter> {
    adapter: A,
    connection: Mutex<Option<A::Connection>>,
}

impl<A: ProtocolAdapter> Session<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            connection: Mutex::new(None),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub async fn read(&self) -> Result<RawReading, AdapterError> {
        let mut slot = self.connection.lock().await;
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.adapter.connect().await?,
        };
        match self.adapter.read_points(&mut conn).await {
            Ok(reading) => {
                *slot = Some(conn);
                Ok(reading)
            }
            Err(err) => {
                debug!(target: "gateway.protocol", error = %err, "connection_dropped");
                self.adapter.disconnect(conn).await;
                Err(err)
            }
        }
    }

    pub async fn close(&self) {
        let conn = self.connection.lock().await.take();
        if let Some(conn) = conn {
            self.adapter.disconnect(conn).await;
        }
    }
}

/// 按协议分派的设备适配器（封闭变体集合）。
pub enum DeviceAdapter {
    Modbus(Session<ModbusAdapter>),
    Bacnet(Session<BacnetAdapter>),
    Snmp(Session<SnmpAdapter>),
}

impl DeviceAdapter {
    /// 校验配置并构造适配器。
    pub fn from_config(config: &DeviceConfig) -> Result<Self, AdapterError> {
        config
            .validate()
            .map_err(|err| AdapterError::InvalidConfig(err.to_string()))?;
        let target = Target {
            host: config.host.trim().to_string(),
            port: config.port(),
        };
        let adapter = match &config.settings {
            ProtocolSettings::Modbus { unit_id, points } => DeviceAdapter::Modbus(Session::new(
                ModbusAdapter::new(target, *unit_id, points.clone()),
            )),
            ProtocolSettings::Bacnet { device_id, points } => {
                DeviceAdapter::Bacnet(Session::new(BacnetAdapter::new(
                    target,
                    *device_id,
                    points.clone(),
                    config.timeout(),
                )))
            }
            ProtocolSettings::Snmp {
                community,
                version,
                points,
            } => DeviceAdapter::Snmp(Session::new(SnmpAdapter::new(
                target,
                community.clone(),
                *version,
                points.clone(),
                config.timeout(),
            ))),
        };
        Ok(adapter)
    }
}

#[async_trait]
impl PointReader for DeviceAdapter {
    async fn read(&self) -> Result<RawReading, AdapterError> {
        match self {
            DeviceAdapter::Modbus(session) => session.read().await,
            DeviceAdapter::Bacnet(session) => session.read().await,
            DeviceAdapter::Snmp(session) => session.read().await,
        }
    }

    async fn close(&self) {
        match self {
            DeviceAdapter::Modbus(session) => session.close().await,
            DeviceAdapter::Bacnet(session) => session.close().await,
            DeviceAdapter::Snmp(session) => session.close().await,
        }
    }
}

/// 设备网络地址。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl Target {
    /// 解析为 socket 地址；解析失败视为暂时不可达。
    pub async fn resolve(&self) -> Result<SocketAddr, AdapterError> {
        if let Ok(ip) = self.host.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|err| {
                AdapterError::ConnectionRefused(format!("cannot resolve {}: {}", self.host, err))
            })?;
        addrs.next().ok_or_else(|| {
            AdapterError::ConnectionRefused(format!("no address for {}", self.host))
        })
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
