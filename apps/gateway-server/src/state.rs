//! 应用状态与组件装配。
//!
//! 所有组件只在这里创建一次，再以 `Arc` / 句柄形式注入 handler：
//!
//! ```text
//! PollScheduler ──▶ [MqttObserver, AlarmEngine]
//!       │                    │
//!       ├──▶ DeviceRegistry ◀── HistoryManager（按 interval 采样）
//!       │                    │
//!       └───── EventHub ◀────┘ ──▶ /ws
//! ```

use crate::observer::MqttObserver;
use gateway_alarm::AlarmEngine;
use gateway_config::AppConfig;
use gateway_events::{
    Correlator, EmailNotifier, EventHub, EventSink, NotifierPresence, RemoteEmailNotifier,
};
use gateway_history::HistoryManager;
use gateway_publish::MqttPublisher;
use gateway_scheduler::{PollObserver, PollScheduler, ReaderFactory, SchedulerConfig};
use gateway_storage::{ConfigRepository, DeviceRegistry, GatewayConfigDocument, HistoryStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: PollScheduler,
    pub alarms: Arc<AlarmEngine>,
    pub history: HistoryManager,
    pub repository: Arc<ConfigRepository>,
    /// 设备变更与配置落盘串行执行
    pub device_writes: Arc<tokio::sync::Mutex<()>>,
    pub hub: EventHub,
    pub correlator: Arc<Correlator>,
    pub notifiers: Arc<NotifierPresence>,
    pub email: Arc<dyn EmailNotifier>,
    /// 历史查询/导出的调用方时限
    pub request_timeout: Duration,
    pub discovery_timeout: Duration,
}

/// 由 main（或测试）提供的外部依赖。
pub struct GatewayParts {
    pub repository: Arc<ConfigRepository>,
    pub history_store: Arc<dyn HistoryStore>,
    pub reader_factory: Arc<dyn ReaderFactory>,
    pub publisher: MqttPublisher,
}

impl AppState {
    pub fn assemble(config: &AppConfig, parts: GatewayParts) -> Self {
        let hub = EventHub::new(config.event_buffer);
        let sink: Arc<dyn EventSink> = Arc::new(hub.clone());
        let correlator = Arc::new(Correlator::new());
        let notifiers = Arc::new(NotifierPresence::new());
        let email: Arc<dyn EmailNotifier> = Arc::new(RemoteEmailNotifier::new(
            sink.clone(),
            correlator.clone(),
            notifiers.clone(),
            config.email_timeout(),
        ));

        let alarms = Arc::new(AlarmEngine::new(
            sink.clone(),
            Some(email.clone()),
            Some(parts.repository.clone()),
        ));
        let registry = Arc::new(DeviceRegistry::new());
        let history = HistoryManager::new(
            parts.history_store,
            sink.clone(),
            registry.clone(),
            Some(parts.repository.clone()),
        );
        let observers: Vec<Arc<dyn PollObserver>> = vec![
            Arc::new(MqttObserver::new(parts.publisher)),
            alarms.clone(),
        ];
        let scheduler = PollScheduler::new(
            registry,
            parts.reader_factory,
            observers,
            sink,
            SchedulerConfig {
                offline_threshold: config.offline_threshold,
                observer_timeout: config.observer_timeout(),
            },
        );

        Self {
            scheduler,
            alarms,
            history,
            repository: parts.repository,
            device_writes: Arc::new(tokio::sync::Mutex::new(())),
            hub,
            correlator,
            notifiers,
            email,
            request_timeout: config.email_timeout(),
            discovery_timeout: config.bacnet_discovery_timeout(),
        }
    }

    /// 用持久化的配置文档恢复设备、告警规则与历史记录器。
    pub async fn restore(&self, document: GatewayConfigDocument) -> Result<(), gateway_alarm::AlarmError> {
        let rules = self.alarms.load(document.alarms)?;
        let loggers = self.history.load(document.history_loggers).await;
        let devices = self.scheduler.load(document.devices).await;
        info!(
            target: "gateway.server",
            devices,
            rules,
            loggers,
            "config_restored"
        );
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.history.shutdown().await;
    }
}
