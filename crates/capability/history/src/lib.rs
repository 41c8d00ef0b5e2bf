//! # 历史记录器管理
//!
//! - 每个启用的记录器一个独立定时任务：按 `interval` 取设备最新数据，
//!   投影到 `dataPoints` 后追加一条记录（只含实际存在的键）
//! - 低频维护任务删除早于 `now - retentionDays` 的记录
//! - 查询按时间升序返回，超出 `limit` 时保留最新一端
//! - 导出 JSON / CSV，时间戳为毫秒精度的 ISO-8601 UTC

mod export;
mod manager;

pub use export::{export_csv, export_json};
pub use manager::HistoryManager;

use domain::LoggerError;
use gateway_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("invalid loggers: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("logger not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("export error: {0}")]
    Export(String),
}

impl From<StorageError> for HistoryError {
    fn from(err: StorageError) -> Self {
        HistoryError::Storage(err.to_string())
    }
}

impl From<Vec<LoggerError>> for HistoryError {
    fn from(errors: Vec<LoggerError>) -> Self {
        HistoryError::Validation(errors.iter().map(ToString::to_string).collect())
    }
}
