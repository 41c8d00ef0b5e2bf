//! # 轮询调度模块
//!
//! 每台设备一个独立定时任务，没有全局 tick：
//!
//! ```text
//! idle ──timer──▶ polling ──success/failure──▶ idle ──sleep(pollInterval)──▶ ...
//! ```
//!
//! - 同一设备任何时刻至多一个轮询在执行（定时轮询与 `poll_now` 共用 in-flight 标记）
//! - 读点受设备 `timeout` 限制；结果写入注册表后依次交给各观察者（MQTT、告警），
//!   每个观察者调用单独限时，互不阻塞
//! - 删除或替换设备时先取消并等待旧任务结束，再移除状态

mod observer;
mod reader;
mod scheduler;

pub use observer::PollObserver;
pub use reader::{ProtocolReaderFactory, ReaderFactory};
pub use scheduler::{PollOutcome, PollScheduler, SchedulerConfig};

use gateway_storage::StorageError;

/// 调度错误。
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid device config: {0}")]
    InvalidConfig(String),
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("device already exists: {0}")]
    Duplicate(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("observer error: {0}")]
    Observer(String),
}

impl From<StorageError> for SchedulerError {
    fn from(err: StorageError) -> Self {
        SchedulerError::Storage(err.to_string())
    }
}
