//! 存储接口定义

use crate::error::StorageError;
use crate::models::{GatewayConfigDocument, HistoryQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{HistoryRecord, LoggerStats};

/// 配置文档存储。
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// 读取配置文档；尚未保存过时返回空文档。
    async fn load(&self) -> Result<GatewayConfigDocument, StorageError>;

    /// 整体替换配置文档。
    async fn save(&self, document: &GatewayConfigDocument) -> Result<(), StorageError>;
}

/// 历史记录存储（按记录器追加写入）。
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, logger_id: &str, record: &HistoryRecord) -> Result<(), StorageError>;

    /// 时间升序返回；超过 limit 时保留最新的 limit 条。
    async fn query(
        &self,
        logger_id: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<HistoryRecord>, StorageError>;

    /// 删除早于 cutoff 的记录，返回删除条数。
    async fn prune_before(
        &self,
        logger_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    async fn stats(&self, logger_id: &str) -> Result<LoggerStats, StorageError>;

    /// 删除记录器的全部记录，返回删除条数。
    async fn delete_logger(&self, logger_id: &str) -> Result<u64, StorageError>;
}
