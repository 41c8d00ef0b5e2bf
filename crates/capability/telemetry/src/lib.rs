//! 追踪、请求 ID 生成与运行计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub polls_succeeded: u64,
    pub polls_failed: u64,
    pub polls_skipped: u64,
    pub poll_latency_ms_total: u64,
    pub poll_latency_ms_count: u64,
    pub mqtt_published: u64,
    pub mqtt_dropped: u64,
    pub alarms_triggered: u64,
    pub alarms_cleared: u64,
    pub history_written: u64,
    pub history_write_failed: u64,
    pub history_pruned: u64,
    pub events_dropped: u64,
}

/// 网关运行计数器。
pub struct TelemetryMetrics {
    polls_succeeded: AtomicU64,
    polls_failed: AtomicU64,
    polls_skipped: AtomicU64,
    poll_latency_ms_total: AtomicU64,
    poll_latency_ms_count: AtomicU64,
    mqtt_published: AtomicU64,
    mqtt_dropped: AtomicU64,
    alarms_triggered: AtomicU64,
    alarms_cleared: AtomicU64,
    history_written: AtomicU64,
    history_write_failed: AtomicU64,
    history_pruned: AtomicU64,
    events_dropped: AtomicU64,
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            polls_succeeded: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
            polls_skipped: AtomicU64::new(0),
            poll_latency_ms_total: AtomicU64::new(0),
            poll_latency_ms_count: AtomicU64::new(0),
            mqtt_published: AtomicU64::new(0),
            mqtt_dropped: AtomicU64::new(0),
            alarms_triggered: AtomicU64::new(0),
            alarms_cleared: AtomicU64::new(0),
            history_written: AtomicU64::new(0),
            history_write_failed: AtomicU64::new(0),
            history_pruned: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls_succeeded: self.polls_succeeded.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            polls_skipped: self.polls_skipped.load(Ordering::Relaxed),
            poll_latency_ms_total: self.poll_latency_ms_total.load(Ordering::Relaxed),
            poll_latency_ms_count: self.poll_latency_ms_count.load(Ordering::Relaxed),
            mqtt_published: self.mqtt_published.load(Ordering::Relaxed),
            mqtt_dropped: self.mqtt_dropped.load(Ordering::Relaxed),
            alarms_triggered: self.alarms_triggered.load(Ordering::Relaxed),
            alarms_cleared: self.alarms_cleared.load(Ordering::Relaxed),
            history_written: self.history_written.load(Ordering::Relaxed),
            history_write_failed: self.history_write_failed.load(Ordering::Relaxed),
            history_pruned: self.history_pruned.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录轮询成功次数与耗时。
pub fn record_poll_succeeded(latency_ms: u64) {
    let metrics = metrics();
    metrics.polls_succeeded.fetch_add(1, Ordering::Relaxed);
    metrics
        .poll_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .poll_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录轮询失败次数。
pub fn record_poll_failed() {
    metrics().polls_failed.fetch_add(1, Ordering::Relaxed);
}

/// 记录因上一轮未完成而跳过的轮询。
pub fn record_poll_skipped() {
    metrics().polls_skipped.fetch_add(1, Ordering::Relaxed);
}

pub fn record_mqtt_published() {
    metrics().mqtt_published.fetch_add(1, Ordering::Relaxed);
}

/// 记录 MQTT 丢弃次数（断线被覆盖或队列已满）。
pub fn record_mqtt_dropped() {
    metrics().mqtt_dropped.fetch_add(1, Ordering::Relaxed);
}

pub fn record_alarm_triggered() {
    metrics().alarms_triggered.fetch_add(1, Ordering::Relaxed);
}

pub fn record_alarm_cleared() {
    metrics().alarms_cleared.fetch_add(1, Ordering::Relaxed);
}

pub fn record_history_written() {
    metrics().history_written.fetch_add(1, Ordering::Relaxed);
}

pub fn record_history_write_failed() {
    metrics()
        .history_write_failed
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录保留期清理删除的记录数。
pub fn record_history_pruned(count: u64) {
    metrics().history_pruned.fetch_add(count, Ordering::Relaxed);
}

/// 记录推送通道无订阅者时丢弃的事件。
pub fn record_event_dropped() {
    metrics().events_dropped.fetch_add(1, Ordering::Relaxed);
}
