//! 协议适配错误类型定义

use std::io;

/// 协议适配错误
///
/// 所有传输层异常都必须收敛到这几个变体，不允许原始 IO 错误越过适配器边界。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    /// 连接被拒绝 / 重置 / 不可达
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// 超时
    #[error("timeout: {0}")]
    Timeout(String),

    /// 设备配置无效
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// 协议层错误（异常码、报文格式错误等）
    #[error("protocol error: {0}")]
    Protocol(String),

    /// 部分点位读取失败
    #[error("partial read: {} of {total} points failed ({})", missing.len(), missing.join(", "))]
    PartialRead { missing: Vec<String>, total: usize },
}

impl AdapterError {
    /// 是否为可恢复的网络类故障（累计到阈值后判定离线）。
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::ConnectionRefused(_) | AdapterError::Timeout(_)
        )
    }

    /// IO 错误映射。
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::AddrNotAvailable => AdapterError::ConnectionRefused(err.to_string()),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                AdapterError::Timeout(err.to_string())
            }
            _ => AdapterError::Protocol(err.to_string()),
        }
    }

    /// 根据失败点位数量决定是部分失败还是整体协议错误。
    pub(crate) fn from_failed_points(missing: Vec<String>, total: usize, reason: &str) -> Self {
        if missing.len() >= total {
            AdapterError::Protocol(format!("all {} points failed: {}", total, reason))
        } else {
            AdapterError::PartialRead { missing, total }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_typed_failures() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(matches!(
            AdapterError::from_io(refused),
            AdapterError::ConnectionRefused(_)
        ));
        let timed_out = io::Error::from(io::ErrorKind::TimedOut);
        assert!(matches!(
            AdapterError::from_io(timed_out),
            AdapterError::Timeout(_)
        ));
        let other = io::Error::from(io::ErrorKind::InvalidData);
        assert!(matches!(
            AdapterError::from_io(other),
            AdapterError::Protocol(_)
        ));
    }

    #[test]
    fn all_points_failing_is_protocol_error() {
        let partial = AdapterError::from_failed_points(vec!["a".to_string()], 2, "exception");
        assert!(matches!(partial, AdapterError::PartialRead { total: 2, .. }));
        assert_eq!(
            partial.to_string(),
            "partial read: 1 of 2 points failed (a)"
        );
        let all = AdapterError::from_failed_points(
            vec!["a".to_string(), "b".to_string()],
            2,
            "exception",
        );
        assert!(matches!(all, AdapterError::Protocol(_)));
        assert!(!all.is_transient());
    }
}
