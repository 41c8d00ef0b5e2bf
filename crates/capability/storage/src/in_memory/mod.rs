//! 内存存储实现
//!
//! 用于本地运行与测试：配置文档保存在进程内，历史记录按记录器分别加锁。

pub mod config;
pub mod history;

pub use config::InMemoryConfigStore;
pub use history::InMemoryHistoryStore;
