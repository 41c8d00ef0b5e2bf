//! 关联 ID 请求/响应
//!
//! 请求方登记一个关联 ID 后发出消息，应答经 [`Correlator::resolve`] 送回；
//! 超时或被取消时登记项一并移除，迟到的应答会被丢弃。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::warn;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request cancelled")]
    Cancelled,
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<String, oneshot::Sender<serde_json::Value>>>,
}

struct PendingGuard<'a> {
    correlator: &'a Correlator,
    correlation_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.forget(&self.correlation_id);
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记关联 ID、调用 `send` 发出请求并等待应答。
    pub async fn request<F>(
        &self,
        timeout: Duration,
        send: F,
    ) -> Result<serde_json::Value, RequestError>
    where
        F: FnOnce(&str) -> Result<(), RequestError>,
    {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| RequestError::Unavailable("lock failed".to_string()))?;
            pending.insert(correlation_id.clone(), tx);
        }
        // 无论正常返回、超时还是调用方放弃，登记项都会被移除
        let _guard = PendingGuard {
            correlator: self,
            correlation_id: correlation_id.clone(),
        };
        send(&correlation_id)?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(RequestError::Cancelled),
            Err(_) => {
                warn!(
                    target: "gateway.events",
                    correlation_id = %correlation_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "correlated_request_timed_out"
                );
                Err(RequestError::Timeout(timeout))
            }
        }
    }

    /// 送回应答；关联 ID 未知（已超时或从未登记）时返回 false。
    pub fn resolve(&self, correlation_id: &str, value: serde_json::Value) -> bool {
        let sender = match self.pending.lock() {
            Ok(mut pending) => pending.remove(correlation_id),
            Err(_) => None,
        };
        match sender {
            Some(sender) => sender.send(value).is_ok(),
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    fn forget(&self, correlation_id: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(correlation_id);
        }
    }
}
