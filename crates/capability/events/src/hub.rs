//! 事件扇出

use crate::event::GatewayEvent;
use gateway_telemetry::record_event_dropped;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

/// 事件接收端；`publish` 不得阻塞调用方。
pub trait EventSink: Send + Sync {
    fn publish(&self, event: GatewayEvent);
}

/// 广播事件中心；订阅方过慢时会跳过旧事件（Lagged）。
#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<GatewayEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSink for EventHub {
    fn publish(&self, event: GatewayEvent) {
        let kind = event.kind();
        if self.sender.send(event).is_err() {
            record_event_dropped();
            debug!(target: "gateway.events", event_type = kind, "event_dropped_no_subscribers");
        }
    }
}

/// 丢弃所有事件。
#[derive(Debug, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _event: GatewayEvent) {}
}

/// 记录所有事件（测试与调试用）。
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<GatewayEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GatewayEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(GatewayEvent::kind).collect()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, event: GatewayEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
