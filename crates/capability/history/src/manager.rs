use crate::HistoryError;
use crate::export::{export_csv, export_json};
use chrono::{DateTime, SubsecRound, Utc};
use domain::{ExportFormat, HistoryLogger, HistoryRecord, LoggerError, LoggerStats, now_utc};
use gateway_events::{EventSink, GatewayEvent};
use gateway_storage::{ConfigRepository, DeviceRegistry, HistoryQuery, HistoryStore};
use gateway_telemetry::{record_history_pruned, record_history_write_failed, record_history_written};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct LoggerSlot {
    logger: HistoryLogger,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LoggerSlot {
    async fn stop(self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle {
            let _ = handle.await;
        }
    }
}

struct HistoryInner {
    store: Arc<dyn HistoryStore>,
    events: Arc<dyn EventSink>,
    repository: Option<Arc<ConfigRepository>>,
    /// 采样时读取设备当前的 lastData
    registry: Arc<DeviceRegistry>,
    slots: Mutex<HashMap<String, LoggerSlot>>,
}

/// 历史记录器管理器。
#[derive(Clone)]
pub struct HistoryManager {
    inner: Arc<HistoryInner>,
}

impl HistoryManager {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        events: Arc<dyn EventSink>,
        registry: Arc<DeviceRegistry>,
        repository: Option<Arc<ConfigRepository>>,
    ) -> Self {
        Self {
            inner: Arc::new(HistoryInner {
                store,
                events,
                repository,
                registry,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// 启动时加载记录器；非法项跳过并记录日志。
    pub async fn load(&self, loggers: Vec<HistoryLogger>) -> usize {
        let mut slots = self.inner.slots.lock().await;
        let mut loaded = 0;
        for logger in loggers {
            if let Err(err) = logger.validate() {
                warn!(target: "gateway.history", logger_id = %logger.id, error = %err, "logger_load_skipped");
                continue;
            }
            if slots.contains_key(&logger.id) {
                warn!(target: "gateway.history", logger_id = %logger.id, "logger_duplicate_skipped");
                continue;
            }
            slots.insert(logger.id.clone(), self.start(logger));
            loaded += 1;
        }
        loaded
    }

    pub async fn loggers(&self) -> Vec<HistoryLogger> {
        let slots = self.inner.slots.lock().await;
        let mut loggers: Vec<HistoryLogger> =
            slots.values().map(|slot| slot.logger.clone()).collect();
        loggers.sort_by(|a, b| a.id.cmp(&b.id));
        loggers
    }

    /// 整体替换记录器列表；任一非法则全部拒绝。
    ///
    /// 先落盘，成功后再切换定时任务。删除的记录器先停止定时任务再删除其记录；
    /// 变更的记录器重启定时任务。
    pub async fn update_loggers(
        &self,
        loggers: Vec<HistoryLogger>,
    ) -> Result<Vec<HistoryLogger>, HistoryError> {
        validate_all(&loggers)?;
        let mut slots = self.inner.slots.lock().await;
        if let Some(repository) = &self.inner.repository {
            let persisted = loggers.clone();
            repository
                .update(move |document| document.history_loggers = persisted)
                .await?;
        }

        let incoming: HashSet<&str> = loggers.iter().map(|logger| logger.id.as_str()).collect();
        let removed: Vec<String> = slots
            .keys()
            .filter(|id| !incoming.contains(id.as_str()))
            .cloned()
            .collect();
        for logger_id in &removed {
            if let Some(slot) = slots.remove(logger_id) {
                slot.stop().await;
            }
            match self.inner.store.delete_logger(logger_id).await {
                Ok(count) => info!(
                    target: "gateway.history",
                    logger_id = %logger_id,
                    deleted = count,
                    "logger_removed"
                ),
                Err(err) => warn!(
                    target: "gateway.history",
                    logger_id = %logger_id,
                    error = %err,
                    "logger_records_delete_failed"
                ),
            }
        }

        for logger in &loggers {
            let unchanged = slots
                .get(&logger.id)
                .is_some_and(|slot| &slot.logger == logger);
            if unchanged {
                continue;
            }
            if let Some(slot) = slots.remove(&logger.id) {
                slot.stop().await;
            }
            slots.insert(logger.id.clone(), self.start(logger.clone()));
        }
        drop(slots);

        info!(
            target: "gateway.history",
            loggers = loggers.len(),
            removed = removed.len(),
            "history_loggers_updated"
        );
        Ok(loggers)
    }

    /// 立即为记录器采样一次；没有任何 dataPoint 可用时不写入。
    pub async fn sample(&self, logger_id: &str) -> Result<Option<HistoryRecord>, HistoryError> {
        let logger = self.logger(logger_id).await?;
        self.inner.sample(&logger, now_utc()).await
    }

    pub async fn query(
        &self,
        logger_id: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        self.logger(logger_id).await?;
        Ok(self.inner.store.query(logger_id, query).await?)
    }

    pub async fn stats(&self, logger_id: &str) -> Result<LoggerStats, HistoryError> {
        self.logger(logger_id).await?;
        Ok(self.inner.store.stats(logger_id).await?)
    }

    pub async fn export(
        &self,
        logger_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        format: ExportFormat,
    ) -> Result<Vec<u8>, HistoryError> {
        let logger = self.logger(logger_id).await?;
        let query = HistoryQuery {
            start,
            end,
            limit: None,
        };
        let records = self.inner.store.query(logger_id, &query).await?;
        debug!(
            target: "gateway.history",
            logger_id = %logger_id,
            records = records.len(),
            format = format.extension(),
            "history_export"
        );
        match format {
            ExportFormat::Json => export_json(&records),
            ExportFormat::Csv => Ok(export_csv(&logger.data_points, &records)),
        }
    }

    /// 删除所有记录器中超出保留期的记录，返回删除总数。
    ///
    /// 单个记录器失败只记录日志，不影响其余记录器。
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<u64, HistoryError> {
        let loggers = self.loggers().await;
        let mut total = 0;
        for logger in loggers {
            let Some(cutoff) = now.checked_sub_signed(logger.retention()) else {
                continue;
            };
            let removed = match self.inner.store.prune_before(&logger.id, cutoff).await {
                Ok(removed) => removed,
                Err(err) => {
                    warn!(target: "gateway.history", logger_id = %logger.id, error = %err, "logger_prune_failed");
                    continue;
                }
            };
            if removed > 0 {
                record_history_pruned(removed);
                info!(
                    target: "gateway.history",
                    logger_id = %logger.id,
                    removed,
                    "history_pruned"
                );
                self.inner.publish_stats(&logger.id).await;
            }
            total += removed;
        }
        Ok(total)
    }

    /// 启动保留期维护任务。
    pub fn spawn_maintenance(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(err) = manager.prune(now_utc()).await {
                    warn!(target: "gateway.history", error = %err, "history_prune_failed");
                }
            }
        })
    }

    pub async fn shutdown(&self) {
        let slots: Vec<LoggerSlot> = {
            let mut slots = self.inner.slots.lock().await;
            slots.drain().map(|(_, slot)| slot).collect()
        };
        for slot in slots {
            slot.stop().await;
        }
    }

    async fn logger(&self, logger_id: &str) -> Result<HistoryLogger, HistoryError> {
        let slots = self.inner.slots.lock().await;
        slots
            .get(logger_id)
            .map(|slot| slot.logger.clone())
            .ok_or_else(|| HistoryError::NotFound(logger_id.to_string()))
    }

    fn start(&self, logger: HistoryLogger) -> LoggerSlot {
        let cancel = CancellationToken::new();
        let handle = logger.enabled.then(|| {
            tokio::spawn(run_logger(
                self.inner.clone(),
                logger.clone(),
                cancel.clone(),
            ))
        });
        LoggerSlot {
            logger,
            cancel,
            handle,
        }
    }
}

async fn run_logger(inner: Arc<HistoryInner>, logger: HistoryLogger, cancel: CancellationToken) {
    debug!(target: "gateway.history", logger_id = %logger.id, "logger_started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(logger.interval()) => {}
        }
        // 写入失败只丢弃本次记录
        if let Err(err) = inner.sample(&logger, now_utc()).await {
            warn!(target: "gateway.history", logger_id = %logger.id, error = %err, "history_tick_failed");
        }
    }
    debug!(target: "gateway.history", logger_id = %logger.id, "logger_stopped");
}

impl HistoryInner {
    async fn sample(
        &self,
        logger: &HistoryLogger,
        now: DateTime<Utc>,
    ) -> Result<Option<HistoryRecord>, HistoryError> {
        let data = self
            .registry
            .get(&logger.device_id)?
            .map(|device| logger.project(&device.last_data))
            .unwrap_or_default();
        if data.is_empty() {
            debug!(target: "gateway.history", logger_id = %logger.id, "history_tick_empty");
            return Ok(None);
        }
        let record = HistoryRecord {
            timestamp: now.trunc_subsecs(3),
            data,
        };
        if let Err(err) = self.store.append(&logger.id, &record).await {
            record_history_write_failed();
            return Err(err.into());
        }
        record_history_written();
        self.publish_stats(&logger.id).await;
        Ok(Some(record))
    }

    async fn publish_stats(&self, logger_id: &str) {
        match self.store.stats(logger_id).await {
            Ok(stats) => self.events.publish(GatewayEvent::HistoryStatsChanged(stats)),
            Err(err) => {
                warn!(target: "gateway.history", logger_id = %logger_id, error = %err, "history_stats_failed")
            }
        }
    }
}

fn validate_all(loggers: &[HistoryLogger]) -> Result<(), HistoryError> {
    let mut errors: Vec<LoggerError> = Vec::new();
    let mut seen = HashSet::new();
    for logger in loggers {
        if let Err(err) = logger.validate() {
            errors.push(err);
        }
        if !seen.insert(logger.id.as_str()) {
            errors.push(LoggerError::Invalid {
                logger_id: logger.id.clone(),
                reason: "duplicate logger id".to_string(),
            });
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}
