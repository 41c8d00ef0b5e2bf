//! Modbus TCP 适配器
//!
//! 每个点位按保持/输入寄存器分别读取，寄存器原始字交给标准化模块解码。
//! 部分点位返回异常码时整体结果为 `PartialRead`，全部失败为协议错误。

use crate::adapter::{ProtocolAdapter, Target};
use crate::error::AdapterError;
use crate::types::{RawReading, RawValue};
use async_trait::async_trait;
use domain::{ModbusPoint, RegisterKind};
use tokio_modbus::prelude::*;
use tracing::{debug, warn};

pub struct ModbusAdapter {
    target: Target,
    unit_id: u8,
    points: Vec<ModbusPoint>,
}

impl ModbusAdapter {
    pub fn new(target: Target, unit_id: u8, points: Vec<ModbusPoint>) -> Self {
        Self {
            target,
            unit_id,
            points,
        }
    }

    pub fn points(&self) -> &[ModbusPoint] {
        &self.points
    }
}

fn map_modbus_error(err: tokio_modbus::Error) -> AdapterError {
    match err {
        tokio_modbus::Error::Transport(err) => AdapterError::from_io(err),
        other => AdapterError::Protocol(other.to_string()),
    }
}

#[async_trait]
impl ProtocolAdapter for ModbusAdapter {
    type Connection = tokio_modbus::client::Context;

    async fn connect(&self) -> Result<Self::Connection, AdapterError> {
        let addr = self.target.resolve().await?;
        let mut ctx = tcp::connect(addr).await.map_err(AdapterError::from_io)?;
        ctx.set_slave(Slave(self.unit_id));
        debug!(target: "gateway.protocol", addr = %addr, unit_id = self.unit_id, "modbus_connected");
        Ok(ctx)
    }

    async fn read_points(&self, ctx: &mut Self::Connection) -> Result<RawReading, AdapterError> {
        let mut reading = RawReading::new();
        let mut failed = Vec::new();
        let mut last_exception = String::new();

        for point in &self.points {
            let (kind, start) = point.resolve();
            let count = point.register_count();
            let response = match kind {
                RegisterKind::Holding => ctx.read_holding_registers(start, count).await,
                RegisterKind::Input => ctx.read_input_registers(start, count).await,
            };
            match response.map_err(map_modbus_error)? {
                Ok(words) if words.len() >= usize::from(count) => {
                    reading.push(point.key(), RawValue::Registers(words));
                }
                Ok(words) => {
                    last_exception = format!("short response ({} of {} registers)", words.len(), count);
                    failed.push(point.key());
                }
                Err(exception) => {
                    warn!(
                        target: "gateway.protocol",
                        register = point.address,
                        exception = ?exception,
                        "modbus_exception"
                    );
                    last_exception = format!("{:?}", exception);
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
                &last_exception,
            ))
        }
    }

    async fn disconnect(&self, mut ctx: Self::Connection) {
        let _ = ctx.disconnect().await;
    }
}
