use async_trait::async_trait;
use domain::Device;
use gateway_publish::{MqttPublisher, PublishOutcome};
use gateway_scheduler::{PollObserver, SchedulerError};
use tracing::debug;

/// 把每次成功轮询转交给 MQTT 发布器。
pub struct MqttObserver {
    publisher: MqttPublisher,
}

impl MqttObserver {
    pub fn new(publisher: MqttPublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl PollObserver for MqttObserver {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn on_reading(&self, device: &Device) -> Result<(), SchedulerError> {
        let outcome = self
            .publisher
            .publish_device(device)
            .map_err(|err| SchedulerError::Observer(err.to_string()))?;
        if outcome != PublishOutcome::Published {
            debug!(
                target: "gateway.mqtt",
                device_id = %device.id(),
                outcome = ?outcome,
                "mqtt_publish_deferred"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::DeviceConfig;

    #[tokio::test]
    async fn disabled_publisher_is_not_an_error() {
        let config: DeviceConfig = serde_json::from_value(serde_json::json!({
            "id": "d1",
            "name": "Sensor",
            "protocol": "modbus",
            "host": "127.0.0.1",
            "points": [40001]
        }))
        .expect("config");
        let observer = MqttObserver::new(MqttPublisher::disabled());
        assert!(observer.on_reading(&Device::new(config)).await.is_ok());
    }
}
