//! Handler 共用辅助函数

pub mod response;
