//! 邮件通知协作方边界
//!
//! 网关不直接发送邮件：请求以 `emailRequest` 推送给已连接的通知方，
//! 通知方的 `emailResponse` 结果原样返回给调用方。
//!
//! 推送连接发送 `emailNotifierReady` 后才算作通知方；普通 UI 连接不计入。

use crate::correlator::{Correlator, RequestError};
use crate::event::{EmailAction, EmailRequest, GatewayEvent};
use crate::hub::EventSink;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 已登记的通知方连接数。
#[derive(Debug, Default)]
pub struct NotifierPresence {
    connected: AtomicUsize,
}

impl NotifierPresence {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个通知方；返回的句柄被丢弃时自动注销。
    pub fn register(self: &Arc<Self>) -> NotifierRegistration {
        self.connected.fetch_add(1, Ordering::AcqRel);
        NotifierRegistration {
            presence: self.clone(),
        }
    }

    pub fn connected(&self) -> usize {
        self.connected.load(Ordering::Acquire)
    }
}

pub struct NotifierRegistration {
    presence: Arc<NotifierPresence>,
}

impl Drop for NotifierRegistration {
    fn drop(&mut self) {
        self.presence.connected.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn request(
        &self,
        action: EmailAction,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, RequestError>;
}

pub struct RemoteEmailNotifier {
    sink: Arc<dyn EventSink>,
    correlator: Arc<Correlator>,
    presence: Arc<NotifierPresence>,
    timeout: Duration,
}

impl RemoteEmailNotifier {
    pub fn new(
        sink: Arc<dyn EventSink>,
        correlator: Arc<Correlator>,
        presence: Arc<NotifierPresence>,
        timeout: Duration,
    ) -> Self {
        Self {
            sink,
            correlator,
            presence,
            timeout,
        }
    }
}

#[async_trait]
impl EmailNotifier for RemoteEmailNotifier {
    async fn request(
        &self,
        action: EmailAction,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, RequestError> {
        if self.presence.connected() == 0 {
            return Err(RequestError::Unavailable(
                "no email notifier connected".to_string(),
            ));
        }
        let sink = self.sink.clone();
        self.correlator
            .request(self.timeout, move |correlation_id| {
                sink.publish(GatewayEvent::EmailRequest(EmailRequest {
                    correlation_id: correlation_id.to_string(),
                    action,
                    payload,
                }));
                Ok(())
            })
            .await
    }
}
