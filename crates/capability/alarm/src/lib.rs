//! # 告警引擎
//!
//! 对每次新读数与设备状态变化评估告警规则，维护冷却期与活动告警。
//!
//! ## 语义
//!
//! - 触发：条件成立、该规则没有活动告警、且距 `lastTriggered` 已过冷却期
//! - 刷新：条件成立且已有活动告警时，只更新观测值、消息与 `updatedAt`，不计数
//! - 清除：threshold / range / change 条件不再成立时立即清除；
//!   status 告警在设备恢复 online 或被确认时清除
//! - 非数值读数既不触发也不清除数值类规则
//!
//! 所有状态只由引擎修改，评估在一把锁内完成，同一设备的读数按到达顺序处理。

mod engine;
mod message;

pub use engine::{AlarmEngine, Evaluation};

use domain::RuleError;

#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("invalid rules: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("active alarm not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("state error: {0}")]
    State(String),
}

impl From<Vec<RuleError>> for AlarmError {
    fn from(errors: Vec<RuleError>) -> Self {
        AlarmError::Validation(errors.iter().map(ToString::to_string).collect())
    }
}
