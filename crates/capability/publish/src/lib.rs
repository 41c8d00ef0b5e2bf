//! # MQTT 发布模块
//!
//! 将每次成功轮询的规范化数据发布到 `<baseTopic>/<deviceId>`。
//!
//! - broker 连接由独立的事件循环任务维护，断线后指数退避重连（1s 起，×2，上限 60s），永不放弃
//! - 发布永不阻塞轮询：使用 `try_publish`，断线期间每台设备只保留最新一条，重连后补发
//! - 配置关闭时发布为空操作

pub mod payload;

pub use payload::{MqttPayload, encode_payload, format_timestamp};

use domain::Device;
use gateway_telemetry::{record_mqtt_dropped, record_mqtt_published};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// MQTT 发布错误。
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("payload error: {0}")]
    Payload(String),
    #[error("client error: {0}")]
    Client(String),
    #[error("state error: {0}")]
    State(String),
}

/// MQTT 发布配置。
#[derive(Debug, Clone)]
pub struct MqttPublisherConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub base_topic: String,
    pub qos: u8,
}

/// 单次发布的去向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// 断线中，已作为该设备的最新待发消息保存。
    Pending,
    Dropped,
    Disabled,
}

#[derive(Default)]
struct LinkState {
    connected: bool,
    /// deviceId -> (topic, payload)
    pending: HashMap<String, (String, Vec<u8>)>,
}

struct Link {
    client: AsyncClient,
    base_topic: String,
    qos: QoS,
    state: Mutex<LinkState>,
}

impl Link {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LinkState>, PublishError> {
        self.state
            .lock()
            .map_err(|_| PublishError::State("lock failed".to_string()))
    }

    /// ConnAck 后调用：标记已连接并补发断线期间的最新消息。
    fn on_connected(&self) -> Result<usize, PublishError> {
        let mut state = self.lock()?;
        state.connected = true;
        let pending: Vec<(String, Vec<u8>)> = state.pending.drain().map(|(_, v)| v).collect();
        let mut flushed = 0;
        for (topic, payload) in pending {
            match self.client.try_publish(topic, self.qos, false, payload) {
                Ok(()) => {
                    flushed += 1;
                    record_mqtt_published();
                }
                Err(err) => {
                    record_mqtt_dropped();
                    warn!(target: "gateway.mqtt", error = %err, "mqtt_flush_failed");
                }
            }
        }
        Ok(flushed)
    }

    fn on_disconnected(&self) -> Result<bool, PublishError> {
        let mut state = self.lock()?;
        Ok(std::mem::replace(&mut state.connected, false))
    }

    fn publish(&self, device_id: &str, payload: Vec<u8>) -> Result<PublishOutcome, PublishError> {
        let topic = format!("{}/{}", self.base_topic, device_id);
        let mut state = self.lock()?;
        if !state.connected {
            if state
                .pending
                .insert(device_id.to_string(), (topic, payload))
                .is_some()
            {
                record_mqtt_dropped();
            }
            return Ok(PublishOutcome::Pending);
        }
        match self.client.try_publish(topic, self.qos, false, payload) {
            Ok(()) => {
                record_mqtt_published();
                Ok(PublishOutcome::Published)
            }
            Err(err) => {
                record_mqtt_dropped();
                warn!(
                    target: "gateway.mqtt",
                    device_id = %device_id,
                    error = %err,
                    "mqtt_publish_dropped"
                );
                Ok(PublishOutcome::Dropped)
            }
        }
    }
}

/// MQTT 发布器；克隆后共享同一连接。
#[derive(Clone)]
pub struct MqttPublisher {
    link: Option<Arc<Link>>,
}

impl MqttPublisher {
    /// 创建发布器并启动连接维护任务。
    pub fn start(config: MqttPublisherConfig) -> (Self, tokio::task::JoinHandle<()>) {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (config.username.clone(), config.password.clone())
        {
            options.set_credentials(username, password);
        }
        let (client, eventloop) = AsyncClient::new(options, 64);
        let link = Arc::new(Link {
            client,
            base_topic: config.base_topic.trim_end_matches('/').to_string(),
            qos: qos_from_u8(config.qos),
            state: Mutex::new(LinkState::default()),
        });
        info!(
            target: "gateway.mqtt",
            host = %config.host,
            port = config.port,
            base_topic = %link.base_topic,
            "mqtt_publisher_started"
        );
        let handle = tokio::spawn(run_event_loop(link.clone(), eventloop));
        (Self { link: Some(link) }, handle)
    }

    /// 未配置 broker 时使用：所有发布均为空操作。
    pub fn disabled() -> Self {
        Self { link: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.link.is_some()
    }

    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .and_then(|link| link.lock().ok().map(|state| state.connected))
            .unwrap_or(false)
    }

    /// 发布设备最新数据；不阻塞。
    pub fn publish_device(&self, device: &Device) -> Result<PublishOutcome, PublishError> {
        let Some(link) = &self.link else {
            return Ok(PublishOutcome::Disabled);
        };
        let timestamp = device.last_updated.unwrap_or_else(domain::now_utc);
        let payload = encode_payload(device, timestamp)?;
        link.publish(device.id(), payload)
    }

    #[cfg(test)]
    fn with_client(client: AsyncClient, base_topic: &str) -> Self {
        Self {
            link: Some(Arc::new(Link {
                client,
                base_topic: base_topic.to_string(),
                qos: QoS::AtMostOnce,
                state: Mutex::new(LinkState::default()),
            })),
        }
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.link
            .as_ref()
            .and_then(|link| link.lock().ok().map(|state| state.pending.len()))
            .unwrap_or(0)
    }
}

async fn run_event_loop(link: Arc<Link>, mut eventloop: EventLoop) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff = INITIAL_BACKOFF;
                match link.on_connected() {
                    Ok(flushed) => info!(target: "gateway.mqtt", flushed, "mqtt_connected"),
                    Err(err) => warn!(target: "gateway.mqtt", error = %err, "mqtt_connect_state_failed"),
                }
            }
            Ok(event) => {
                debug!(target: "gateway.mqtt", event = ?event, "mqtt_event");
            }
            Err(err) => {
                let was_connected = link.on_disconnected().unwrap_or(false);
                warn!(
                    target: "gateway.mqtt",
                    error = %err,
                    was_connected,
                    retry_in_ms = backoff.as_millis() as u64,
                    "mqtt_connection_lost"
                );
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
            }
        }
    }
}

pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{DeviceConfig, ModbusPoint, PointValue, ProtocolSettings};

    fn device(id: &str, value: f64) -> Device {
        let mut device = Device::new(DeviceConfig {
            id: id.to_string(),
            name: "Sensor".to_string(),
            host: "127.0.0.1".to_string(),
            port: None,
            poll_interval_ms: 1000,
            timeout_ms: 500,
            enabled: true,
            settings: ProtocolSettings::Modbus {
                unit_id: 1,
                points: vec![ModbusPoint::new(40001)],
            },
        });
        device
            .last_data
            .insert("register_40001".to_string(), PointValue::Number(value));
        device
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff = INITIAL_BACKOFF;
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(backoff.as_secs());
            backoff = next_backoff(backoff);
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[tokio::test]
    async fn disabled_publisher_is_noop() {
        let publisher = MqttPublisher::disabled();
        assert!(!publisher.is_enabled());
        let outcome = publisher.publish_device(&device("d1", 1.0)).expect("publish");
        assert_eq!(outcome, PublishOutcome::Disabled);
    }

    #[tokio::test]
    async fn disconnected_keeps_latest_per_device_and_flushes() {
        let options = MqttOptions::new("test-client", "127.0.0.1", 1883);
        let (client, _eventloop) = AsyncClient::new(options, 16);
        let publisher = MqttPublisher::with_client(client, "iot/gateway");

        for value in [1.0, 2.0, 3.0] {
            let outcome = publisher.publish_device(&device("d1", value)).expect("publish");
            assert_eq!(outcome, PublishOutcome::Pending);
        }
        publisher.publish_device(&device("d2", 9.0)).expect("publish");
        assert_eq!(publisher.pending_count(), 2);

        let link = publisher.link.clone().expect("link");
        {
            let state = link.lock().expect("state");
            let (topic, payload) = state.pending.get("d1").expect("pending d1");
            assert_eq!(topic, "iot/gateway/d1");
            let value: serde_json::Value = serde_json::from_slice(payload).expect("json");
            assert_eq!(value["data"]["register_40001"], 3.0);
        }

        assert_eq!(link.on_connected().expect("flush"), 2);
        assert!(publisher.is_connected());
        assert_eq!(publisher.pending_count(), 0);

        let outcome = publisher.publish_device(&device("d1", 4.0)).expect("publish");
        assert_eq!(outcome, PublishOutcome::Published);
    }
}
