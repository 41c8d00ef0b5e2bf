use crate::SchedulerError;
use async_trait::async_trait;
use domain::{Device, DeviceStatus};

/// 轮询结果的下游（MQTT 发布、告警引擎）。
///
/// 每次调用都由调度器限时；超时或返回错误只记录日志。
#[async_trait]
pub trait PollObserver: Send + Sync {
    fn name(&self) -> &'static str;

    /// 成功轮询后的设备快照（已写入注册表）。
    async fn on_reading(&self, device: &Device) -> Result<(), SchedulerError>;

    async fn on_status_change(
        &self,
        _device: &Device,
        _previous: DeviceStatus,
    ) -> Result<(), SchedulerError> {
        Ok(())
    }

    async fn on_device_removed(&self, _device_id: &str) -> Result<(), SchedulerError> {
        Ok(())
    }
}
