//! 内存历史记录存储

use crate::error::StorageError;
use crate::models::HistoryQuery;
use crate::traits::HistoryStore;
use chrono::{DateTime, Utc};
use domain::{HistoryRecord, LoggerStats};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type Records = Arc<RwLock<Vec<HistoryRecord>>>;

/// 每个记录器一份按时间升序排列的记录。
#[derive(Default)]
pub struct InMemoryHistoryStore {
    loggers: RwLock<HashMap<String, Records>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self, logger_id: &str) -> Result<Option<Records>, StorageError> {
        let loggers = self
            .loggers
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(loggers.get(logger_id).cloned())
    }

    fn records_or_insert(&self, logger_id: &str) -> Result<Records, StorageError> {
        if let Some(records) = self.records(logger_id)? {
            return Ok(records);
        }
        let mut loggers = self
            .loggers
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(loggers.entry(logger_id.to_string()).or_default().clone())
    }
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, logger_id: &str, record: &HistoryRecord) -> Result<(), StorageError> {
        let records = self.records_or_insert(logger_id)?;
        let mut records = records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let index = records.partition_point(|item| item.timestamp <= record.timestamp);
        records.insert(index, record.clone());
        Ok(())
    }

    async fn query(
        &self,
        logger_id: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<HistoryRecord>, StorageError> {
        let Some(records) = self.records(logger_id)? else {
            return Ok(Vec::new());
        };
        let records = records
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut matched: Vec<HistoryRecord> = records
            .iter()
            .filter(|record| query.contains(record.timestamp))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }
        Ok(matched)
    }

    async fn prune_before(
        &self,
        logger_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let Some(records) = self.records(logger_id)? else {
            return Ok(0);
        };
        let mut records = records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let expired = records.partition_point(|record| record.timestamp < cutoff);
        records.drain(..expired);
        Ok(expired as u64)
    }

    async fn stats(&self, logger_id: &str) -> Result<LoggerStats, StorageError> {
        let Some(records) = self.records(logger_id)? else {
            return Ok(LoggerStats::empty(logger_id));
        };
        let records = records
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(LoggerStats {
            logger_id: logger_id.to_string(),
            record_count: records.len() as u64,
            oldest_timestamp: records.first().map(|record| record.timestamp),
            newest_timestamp: records.last().map(|record| record.timestamp),
        })
    }

    async fn delete_logger(&self, logger_id: &str) -> Result<u64, StorageError> {
        let mut loggers = self
            .loggers
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(records) = loggers.remove(logger_id) else {
            return Ok(0);
        };
        let count = records
            .read()
            .map_err(|_| StorageError::new("lock failed"))?
            .len();
        Ok(count as u64)
    }
}
