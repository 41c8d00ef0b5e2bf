//! Postgres 连接池（仅历史记录后端使用）

use crate::error::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

/// 历史写入只有各记录器的定时任务与查询请求，连接数不需要很大。
const MAX_CONNECTIONS: u32 = 4;

pub async fn connect_pool(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    info!(
        target: "gateway.storage",
        max_connections = MAX_CONNECTIONS,
        "history_pool_connected"
    );
    Ok(pool)
}
