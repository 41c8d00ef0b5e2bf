//! # PostgreSQL 存储实现模块
//!
//! 历史记录的 PostgreSQL 实现，适用于记录量大或需要多实例共享的部署。
//!
//! ## 数据库模式
//!
//! - `history_records`：（id bigserial, logger_id text, ts_ms bigint, data text）
//! - `idx_history_records_logger_ts`：(logger_id, ts_ms) 复合索引
//!
//! 表与索引在 [`PgHistoryStore::ensure_schema`] 中以 `if not exists` 创建。
//!
//! ## 约定
//!
//! - 所有查询使用参数绑定（`$1`, `$2` 等）
//! - 时间戳以 Unix 毫秒存储，读出时还原为 UTC
//! - `data` 列存放点位键值的 JSON 文本

pub mod history;

pub use history::*;
