use crate::SchedulerError;
use crate::observer::PollObserver;
use crate::reader::ReaderFactory;
use domain::{Device, DeviceConfig, DeviceStatus, now_utc};
use gateway_events::{EventSink, GatewayEvent};
use gateway_normalize::Normalizer;
use gateway_protocol::{AdapterError, PointReader};
use gateway_storage::DeviceRegistry;
use gateway_telemetry::{record_poll_failed, record_poll_skipped, record_poll_succeeded};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 调度参数。
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 连续多少次超时/拒绝连接后置为 offline。
    pub offline_threshold: u32,
    /// 单个观察者调用的时限。
    pub observer_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            offline_threshold: 3,
            observer_timeout: Duration::from_secs(2),
        }
    }
}

/// 单次轮询结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded,
    Failed,
    /// 已有轮询在执行，或设备被禁用。
    Skipped,
}

struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct DeviceSlot {
    reader: Arc<dyn PointReader>,
    /// 同一设备 id 的所有配置版本共用
    in_flight: Arc<AtomicBool>,
    /// `poll_now` 持读锁执行；停止时取写锁等待其退出
    manual: Arc<RwLock<()>>,
    enabled: bool,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl DeviceSlot {
    /// 取消并等待定时任务与进行中的 `poll_now`，再关闭连接。
    async fn stop(self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle {
            let _ = handle.await;
        }
        let _idle = self.manual.write().await;
        self.reader.close().await;
    }
}

struct SchedulerInner {
    registry: Arc<DeviceRegistry>,
    factory: Arc<dyn ReaderFactory>,
    normalizer: Normalizer,
    observers: Vec<Arc<dyn PollObserver>>,
    events: Arc<dyn EventSink>,
    config: SchedulerConfig,
    slots: Mutex<HashMap<String, DeviceSlot>>,
}

/// 设备轮询调度器。
#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<SchedulerInner>,
}

impl PollScheduler {
    /// `observers` 按给定顺序接收每次成功轮询的结果。
    pub fn new(
        registry: Arc<DeviceRegistry>,
        factory: Arc<dyn ReaderFactory>,
        observers: Vec<Arc<dyn PollObserver>>,
        events: Arc<dyn EventSink>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                factory,
                normalizer: Normalizer::new(),
                observers,
                events,
                config,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.inner.registry
    }

    /// 注册新设备并启动其定时任务。
    pub async fn add_device(&self, config: DeviceConfig) -> Result<Device, SchedulerError> {
        let reader = self
            .inner
            .factory
            .create(&config)
            .map_err(|err| SchedulerError::InvalidConfig(err.to_string()))?;
        let mut slots = self.inner.slots.lock().await;
        if slots.contains_key(&config.id) {
            return Err(SchedulerError::Duplicate(config.id));
        }
        self.inner
            .registry
            .insert(config.clone())
            .map_err(|_| SchedulerError::Duplicate(config.id.clone()))?;
        let in_flight = Arc::new(AtomicBool::new(false));
        let device = self.activate(&mut slots, config, reader, in_flight)?;
        info!(
            target: "gateway.poll",
            device_id = %device.id(),
            protocol = %device.config.protocol(),
            enabled = device.config.enabled,
            "device_added"
        );
        Ok(device)
    }

    /// 以新配置替换设备：旧任务先取消并结束，再启动新任务。
    pub async fn update_device(&self, config: DeviceConfig) -> Result<Device, SchedulerError> {
        let reader = self
            .inner
            .factory
            .create(&config)
            .map_err(|err| SchedulerError::InvalidConfig(err.to_string()))?;
        let mut slots = self.inner.slots.lock().await;
        let Some(old) = slots.remove(&config.id) else {
            return Err(SchedulerError::NotFound(config.id));
        };
        let in_flight = old.in_flight.clone();
        old.stop().await;
        self.inner.registry.replace(config.clone())?;
        let device = self.activate(&mut slots, config, reader, in_flight)?;
        info!(target: "gateway.poll", device_id = %device.id(), "device_replaced");
        Ok(device)
    }

    /// 删除设备：先停止定时任务，再移除注册表状态并通知观察者。
    pub async fn remove_device(&self, device_id: &str) -> Result<Device, SchedulerError> {
        let mut slots = self.inner.slots.lock().await;
        let Some(slot) = slots.remove(device_id) else {
            return Err(SchedulerError::NotFound(device_id.to_string()));
        };
        slot.stop().await;
        drop(slots);
        let removed = self
            .inner
            .registry
            .remove(device_id)?
            .ok_or_else(|| SchedulerError::NotFound(device_id.to_string()))?;
        for observer in &self.inner.observers {
            self.inner
                .bounded(observer.name(), "device_removed", observer.on_device_removed(device_id))
                .await;
        }
        info!(target: "gateway.poll", device_id = %device_id, "device_removed");
        Ok(removed)
    }

    /// 立即轮询一次（与定时轮询共用 in-flight 标记）。
    ///
    /// 设备在此期间被替换或删除时，本次轮询被取消并返回 `Skipped`。
    pub async fn poll_now(&self, device_id: &str) -> Result<PollOutcome, SchedulerError> {
        let (reader, in_flight, enabled, cancel, _running) = {
            let slots = self.inner.slots.lock().await;
            let slot = slots
                .get(device_id)
                .ok_or_else(|| SchedulerError::NotFound(device_id.to_string()))?;
            (
                slot.reader.clone(),
                slot.in_flight.clone(),
                slot.enabled,
                slot.cancel.clone(),
                slot.manual.clone().read_owned().await,
            )
        };
        if !enabled {
            debug!(target: "gateway.poll", device_id = %device_id, "poll_now_disabled_device");
            return Ok(PollOutcome::Skipped);
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(target: "gateway.poll", device_id = %device_id, "poll_now_cancelled");
                Ok(PollOutcome::Skipped)
            }
            outcome = self.inner.poll_once(device_id, &reader, &in_flight) => Ok(outcome),
        }
    }

    /// 启动时批量加载；单台设备失败只记录日志。
    pub async fn load(&self, configs: Vec<DeviceConfig>) -> usize {
        let mut loaded = 0;
        for config in configs {
            let device_id = config.id.clone();
            match self.add_device(config).await {
                Ok(_) => loaded += 1,
                Err(err) => warn!(
                    target: "gateway.poll",
                    device_id = %device_id,
                    error = %err,
                    "device_load_failed"
                ),
            }
        }
        loaded
    }

    /// 停止所有定时任务。
    pub async fn shutdown(&self) {
        let slots: Vec<DeviceSlot> = {
            let mut slots = self.inner.slots.lock().await;
            slots.drain().map(|(_, slot)| slot).collect()
        };
        for slot in slots {
            slot.stop().await;
        }
        info!(target: "gateway.poll", "scheduler_stopped");
    }

    fn activate(
        &self,
        slots: &mut HashMap<String, DeviceSlot>,
        config: DeviceConfig,
        reader: Arc<dyn PointReader>,
        in_flight: Arc<AtomicBool>,
    ) -> Result<Device, SchedulerError> {
        let device_id = config.id.clone();
        let enabled = config.enabled;
        let cancel = CancellationToken::new();
        let device = if enabled {
            self.inner
                .registry
                .update(&device_id, |device| device.status = DeviceStatus::Connecting)?
                .ok_or_else(|| SchedulerError::NotFound(device_id.clone()))?
        } else {
            self.inner
                .registry
                .get(&device_id)?
                .ok_or_else(|| SchedulerError::NotFound(device_id.clone()))?
        };
        let handle = enabled.then(|| {
            tokio::spawn(run_device(
                self.inner.clone(),
                device_id.clone(),
                reader.clone(),
                in_flight.clone(),
                cancel.clone(),
                config.poll_interval(),
            ))
        });
        slots.insert(
            device_id,
            DeviceSlot {
                reader,
                in_flight,
                manual: Arc::new(RwLock::new(())),
                enabled,
                cancel,
                handle,
            },
        );
        self.inner.events.publish(GatewayEvent::DeviceUpdate(device.clone()));
        Ok(device)
    }
}

async fn run_device(
    inner: Arc<SchedulerInner>,
    device_id: String,
    reader: Arc<dyn PointReader>,
    in_flight: Arc<AtomicBool>,
    cancel: CancellationToken,
    interval: Duration,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = inner.poll_once(&device_id, &reader, &in_flight) => {}
        }
        // 下一次在本次完成后 pollInterval 触发
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!(target: "gateway.poll", device_id = %device_id, "poll_task_stopped");
}

impl SchedulerInner {
    async fn poll_once(
        &self,
        device_id: &str,
        reader: &Arc<dyn PointReader>,
        in_flight: &Arc<AtomicBool>,
    ) -> PollOutcome {
        let Some(_guard) = InFlightGuard::acquire(in_flight) else {
            record_poll_skipped();
            debug!(target: "gateway.poll", device_id = %device_id, "poll_skipped_in_flight");
            return PollOutcome::Skipped;
        };
        let device = match self.registry.get(device_id) {
            Ok(Some(device)) => device,
            Ok(None) => return PollOutcome::Skipped,
            Err(err) => {
                warn!(target: "gateway.poll", device_id = %device_id, error = %err, "registry_read_failed");
                return PollOutcome::Skipped;
            }
        };

        let started = Instant::now();
        let timeout = device.config.timeout();
        let result = match tokio::time::timeout(timeout, reader.read()).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(format!(
                "no response within {} ms",
                timeout.as_millis()
            ))),
        };
        let result = result.and_then(|reading| {
            self.normalizer
                .normalize(&device.config.settings, &reading)
                .map_err(|err| AdapterError::Protocol(err.to_string()))
        });

        match result {
            Ok(data) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                record_poll_succeeded(latency_ms);
                let now = now_utc();
                let mut previous = device.status;
                let updated = self.registry.update(device_id, |device| {
                    previous = device.status;
                    device.status = DeviceStatus::Online;
                    device.last_data = data;
                    device.last_updated = Some(now);
                    device.last_error = None;
                    device.consecutive_failures = 0;
                });
                let Some(updated) = self.updated_or_log(device_id, updated) else {
                    return PollOutcome::Succeeded;
                };
                debug!(
                    target: "gateway.poll",
                    device_id = %device_id,
                    latency_ms,
                    points = updated.last_data.len(),
                    "poll_succeeded"
                );
                self.notify_status(&updated, previous).await;
                for observer in &self.observers {
                    self.bounded(observer.name(), "reading", observer.on_reading(&updated))
                        .await;
                }
                self.events.publish(GatewayEvent::DeviceUpdate(updated));
                PollOutcome::Succeeded
            }
            Err(err) => {
                record_poll_failed();
                let threshold = self.config.offline_threshold;
                let transient = err.is_transient();
                let reason = err.to_string();
                let mut previous = device.status;
                let updated = self.registry.update(device_id, |device| {
                    previous = device.status;
                    device.consecutive_failures = device.consecutive_failures.saturating_add(1);
                    device.last_error = Some(reason.clone());
                    if !transient {
                        device.status = DeviceStatus::Error;
                    } else if device.consecutive_failures >= threshold {
                        device.status = DeviceStatus::Offline;
                    }
                });
                let Some(updated) = self.updated_or_log(device_id, updated) else {
                    return PollOutcome::Failed;
                };
                warn!(
                    target: "gateway.poll",
                    device_id = %device_id,
                    error = %reason,
                    consecutive_failures = updated.consecutive_failures,
                    status = %updated.status,
                    "poll_failed"
                );
                self.notify_status(&updated, previous).await;
                self.events.publish(GatewayEvent::DeviceUpdate(updated));
                PollOutcome::Failed
            }
        }
    }

    fn updated_or_log(
        &self,
        device_id: &str,
        updated: Result<Option<Device>, gateway_storage::StorageError>,
    ) -> Option<Device> {
        match updated {
            Ok(device) => device,
            Err(err) => {
                warn!(target: "gateway.poll", device_id = %device_id, error = %err, "registry_update_failed");
                None
            }
        }
    }

    async fn notify_status(&self, device: &Device, previous: DeviceStatus) {
        if device.status == previous {
            return;
        }
        info!(
            target: "gateway.poll",
            device_id = %device.id(),
            from = %previous,
            to = %device.status,
            "device_status_changed"
        );
        for observer in &self.observers {
            self.bounded(
                observer.name(),
                "status_change",
                observer.on_status_change(device, previous),
            )
            .await;
        }
    }

    async fn bounded<F>(&self, observer: &'static str, stage: &'static str, call: F)
    where
        F: Future<Output = Result<(), SchedulerError>>,
    {
        match tokio::time::timeout(self.config.observer_timeout, call).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                target: "gateway.poll",
                observer,
                stage,
                error = %err,
                "observer_failed"
            ),
            Err(_) => warn!(
                target: "gateway.poll",
                observer,
                stage,
                timeout_ms = self.config.observer_timeout.as_millis() as u64,
                "observer_timed_out"
            ),
        }
    }
}
