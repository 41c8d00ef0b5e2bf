//! # Gateway Storage 模块
//!
//! 网关运行时状态与持久化的统一存储抽象层。
//!
//! ## 模块说明
//!
//! - [`registry`]：设备注册表（配置 + 实时状态，设备是否可达的唯一来源）
//! - [`traits`]：存储接口定义（配置文档、历史记录）
//! - [`models`]：配置文档与历史查询模型
//! - [`error`]：存储错误类型定义
//! - [`connection`]：PostgreSQL 连接池管理
//! - [`config_repository`]：配置文档的串行化读改写
//!
//! ### 存储实现
//!
//! - [`in_memory`]：内存存储实现
//!   - 使用 `RwLock<HashMap>` 提供线程安全的内存存储
//!   - 历史记录按记录器分锁：写入只有该记录器的定时任务，读取取快照
//! - [`file`]：JSON 文件配置存储（临时文件 + rename 原子替换）
//! - [`postgres`]：PostgreSQL 历史记录存储
//!   - 使用 sqlx 参数化查询
//!   - 启动时自动建表（`history_records`）

pub mod config_repository;
pub mod connection;
pub mod error;
pub mod file;
pub mod in_memory;
pub mod models;
pub mod postgres;
pub mod registry;
pub mod traits;

pub use config_repository::ConfigRepository;
pub use connection::*;
pub use error::*;
pub use file::FileConfigStore;
pub use in_memory::{InMemoryConfigStore, InMemoryHistoryStore};
pub use models::*;
pub use postgres::PgHistoryStore;
pub use registry::DeviceRegistry;
pub use traits::*;
