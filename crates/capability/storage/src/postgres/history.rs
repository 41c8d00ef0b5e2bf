//! Postgres 历史记录实现

use crate::error::StorageError;
use crate::models::HistoryQuery;
use crate::traits::HistoryStore;
use chrono::{DateTime, TimeZone, Utc};
use domain::{DeviceData, HistoryRecord, LoggerStats};
use sqlx::{PgPool, Row};

pub struct PgHistoryStore {
    pub pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            "create table if not exists history_records (\
                id bigserial primary key, \
                logger_id text not null, \
                ts_ms bigint not null, \
                data text not null)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "create index if not exists idx_history_records_logger_ts \
             on history_records (logger_id, ts_ms)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn from_millis(ts_ms: i64) -> Result<DateTime<Utc>, StorageError> {
    Utc.timestamp_millis_opt(ts_ms)
        .single()
        .ok_or_else(|| StorageError::new(format!("invalid timestamp: {}", ts_ms)))
}

#[async_trait::async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, logger_id: &str, record: &HistoryRecord) -> Result<(), StorageError> {
        let data = serde_json::to_string(&record.data)?;
        sqlx::query("insert into history_records (logger_id, ts_ms, data) values ($1, $2, $3)")
            .bind(logger_id)
            .bind(record.timestamp.timestamp_millis())
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        logger_id: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<HistoryRecord>, StorageError> {
        let start = query.start.map(|ts| ts.timestamp_millis());
        let end = query.end.map(|ts| ts.timestamp_millis());
        let limit = query
            .limit
            .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
        // 倒序取最新的 limit 条，再翻转为升序
        let rows = sqlx::query(
            "select ts_ms, data from history_records \
             where logger_id = $1 \
               and ($2::bigint is null or ts_ms >= $2) \
               and ($3::bigint is null or ts_ms <= $3) \
             order by ts_ms desc, id desc \
             limit $4",
        )
        .bind(logger_id)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows.into_iter().rev() {
            let ts_ms: i64 = row.try_get("ts_ms")?;
            let data: String = row.try_get("data")?;
            records.push(HistoryRecord {
                timestamp: from_millis(ts_ms)?,
                data: serde_json::from_str::<DeviceData>(&data)?,
            });
        }
        Ok(records)
    }

    async fn prune_before(
        &self,
        logger_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let result = sqlx::query("delete from history_records where logger_id = $1 and ts_ms < $2")
            .bind(logger_id)
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn stats(&self, logger_id: &str) -> Result<LoggerStats, StorageError> {
        let row = sqlx::query(
            "select count(*) as record_count, min(ts_ms) as oldest, max(ts_ms) as newest \
             from history_records where logger_id = $1",
        )
        .bind(logger_id)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("record_count")?;
        let oldest: Option<i64> = row.try_get("oldest")?;
        let newest: Option<i64> = row.try_get("newest")?;
        Ok(LoggerStats {
            logger_id: logger_id.to_string(),
            record_count: u64::try_from(count).unwrap_or(0),
            oldest_timestamp: oldest.map(from_millis).transpose()?,
            newest_timestamp: newest.map(from_millis).transpose()?,
        })
    }

    async fn delete_logger(&self, logger_id: &str) -> Result<u64, StorageError> {
        let result = sqlx::query("delete from history_records where logger_id = $1")
            .bind(logger_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
