use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use domain::{AlarmRule, Device, DeviceConfig, DeviceData, DeviceStatus, PointValue};
use gateway_alarm::{AlarmEngine, AlarmError};
use gateway_events::RecordingEventSink;
use gateway_scheduler::PollObserver;
use gateway_storage::{
    ConfigRepository, ConfigStore, GatewayConfigDocument, InMemoryConfigStore, StorageError,
};
use serde_json::json;
use std::sync::Arc;

/// 保存总是失败的配置存储。
struct ReadOnlyConfigStore;

#[async_trait]
impl ConfigStore for ReadOnlyConfigStore {
    async fn load(&self) -> Result<GatewayConfigDocument, StorageError> {
        Ok(GatewayConfigDocument::default())
    }

    async fn save(&self, _document: &GatewayConfigDocument) -> Result<(), StorageError> {
        Err(StorageError::new("read-only file system"))
    }
}

/// 每次保存前等待一段时间的配置存储。
struct SlowConfigStore {
    inner: InMemoryConfigStore,
    delay: std::time::Duration,
}

#[async_trait]
impl ConfigStore for SlowConfigStore {
    async fn load(&self) -> Result<GatewayConfigDocument, StorageError> {
        self.inner.load().await
    }

    async fn save(&self, document: &GatewayConfigDocument) -> Result<(), StorageError> {
        tokio::time::sleep(self.delay).await;
        self.inner.save(document).await
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).single().expect("time")
}

fn reading(key: &str, value: f64) -> DeviceData {
    let mut data = DeviceData::new();
    data.insert(key.to_string(), PointValue::Number(value));
    data
}

fn rule(value: serde_json::Value) -> AlarmRule {
    serde_json::from_value(value).expect("rule")
}

fn threshold_rule(cooldown_ms: u64) -> AlarmRule {
    rule(json!({
        "id": "r1",
        "name": "High temperature",
        "deviceId": "d1",
        "dataKey": "temperature",
        "type": "threshold",
        "operator": "gt",
        "value": 30,
        "severity": "high",
        "cooldownPeriod": cooldown_ms
    }))
}

async fn engine_with(rules: Vec<AlarmRule>) -> (AlarmEngine, Arc<RecordingEventSink>) {
    let events = Arc::new(RecordingEventSink::new());
    let engine = AlarmEngine::new(events.clone(), None, None);
    engine.update_alarms(rules).await.expect("rules");
    (engine, events)
}

#[tokio::test]
async fn threshold_triggers_once_and_clears() {
    let (engine, _) = engine_with(vec![threshold_rule(60_000)]).await;
    let mut triggered = 0;
    let mut cleared = 0;
    // 间隔大于冷却期
    for (i, value) in [25.0, 32.0, 33.0, 28.0].into_iter().enumerate() {
        let now = t0() + Duration::minutes(5 * i as i64);
        let evaluation = engine
            .evaluate_reading("d1", &reading("temperature", value), now)
            .expect("evaluate");
        triggered += evaluation.triggered.len();
        cleared += evaluation.cleared.len();
        if value == 32.0 {
            assert_eq!(evaluation.triggered.len(), 1);
            assert_eq!(evaluation.triggered[0].value, Some(PointValue::Number(32.0)));
            assert_eq!(
                evaluation.triggered[0].message,
                "High temperature: temperature = 32 (> 30)"
            );
        }
        if value == 28.0 {
            assert_eq!(evaluation.cleared.len(), 1);
            assert!(evaluation.cleared[0].cleared);
        }
    }
    assert_eq!(triggered, 1);
    assert_eq!(cleared, 1);
    assert!(engine.active_alarms().expect("active").is_empty());
    assert_eq!(engine.rules().expect("rules")[0].trigger_count, 1);
}

#[tokio::test]
async fn holding_condition_within_cooldown_refreshes() {
    let (engine, _) = engine_with(vec![threshold_rule(60_000)]).await;
    let first = engine
        .evaluate_reading("d1", &reading("temperature", 32.0), t0())
        .expect("evaluate");
    assert_eq!(first.triggered.len(), 1);

    let later = t0() + Duration::seconds(10);
    let second = engine
        .evaluate_reading("d1", &reading("temperature", 35.0), later)
        .expect("evaluate");
    assert!(second.triggered.is_empty());
    assert_eq!(second.refreshed.len(), 1);

    let active = engine.active_alarms().expect("active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].value, Some(PointValue::Number(35.0)));
    assert_eq!(active[0].triggered_at, t0());
    assert_eq!(active[0].updated_at, later);
    let rules = engine.rules().expect("rules");
    assert_eq!(rules[0].trigger_count, 1);
    assert_eq!(rules[0].last_triggered, Some(t0()));
}

#[tokio::test]
async fn cooldown_counts_from_last_trigger_across_clears() {
    let (engine, _) = engine_with(vec![threshold_rule(60_000)]).await;
    engine
        .evaluate_reading("d1", &reading("temperature", 32.0), t0())
        .expect("evaluate");
    engine
        .evaluate_reading("d1", &reading("temperature", 20.0), t0() + Duration::seconds(10))
        .expect("evaluate");
    let suppressed = engine
        .evaluate_reading("d1", &reading("temperature", 40.0), t0() + Duration::seconds(30))
        .expect("evaluate");
    assert!(suppressed.triggered.is_empty());
    assert!(engine.active_alarms().expect("active").is_empty());

    let retriggered = engine
        .evaluate_reading("d1", &reading("temperature", 40.0), t0() + Duration::seconds(61))
        .expect("evaluate");
    assert_eq!(retriggered.triggered.len(), 1);
    assert_eq!(engine.rules().expect("rules")[0].trigger_count, 2);
}

#[tokio::test]
async fn range_triggers_outside_and_clears_inside() {
    let (engine, _) = engine_with(vec![rule(json!({
        "id": "r2",
        "deviceId": "d1",
        "dataKey": "humidity",
        "type": "range",
        "minValue": 10,
        "maxValue": 20
    }))])
    .await;
    let outside = engine
        .evaluate_reading("d1", &reading("humidity", 25.0), t0())
        .expect("evaluate");
    assert_eq!(outside.triggered.len(), 1);
    let inside = engine
        .evaluate_reading("d1", &reading("humidity", 15.0), t0() + Duration::seconds(5))
        .expect("evaluate");
    assert_eq!(inside.cleared.len(), 1);
}

#[tokio::test]
async fn change_rule_needs_previous_value() {
    let (engine, _) = engine_with(vec![rule(json!({
        "id": "r3",
        "deviceId": "d1",
        "dataKey": "pressure",
        "type": "change",
        "changeAmount": 5,
        "cooldownPeriod": 0
    }))])
    .await;
    let first = engine
        .evaluate_reading("d1", &reading("pressure", 100.0), t0())
        .expect("evaluate");
    assert!(first.is_empty());
    let jump = engine
        .evaluate_reading("d1", &reading("pressure", 106.0), t0() + Duration::seconds(1))
        .expect("evaluate");
    assert_eq!(jump.triggered.len(), 1);
    let steady = engine
        .evaluate_reading("d1", &reading("pressure", 107.0), t0() + Duration::seconds(2))
        .expect("evaluate");
    assert_eq!(steady.cleared.len(), 1);

    // 删除设备后变化量从头跟踪
    engine.remove_device("d1").expect("remove");
    let after = engine
        .evaluate_reading("d1", &reading("pressure", 200.0), t0() + Duration::seconds(3))
        .expect("evaluate");
    assert!(after.triggered.is_empty());
}

#[tokio::test]
async fn non_numeric_values_neither_trigger_nor_clear() {
    let (engine, _) = engine_with(vec![threshold_rule(0)]).await;
    engine
        .evaluate_reading("d1", &reading("temperature", 35.0), t0())
        .expect("evaluate");
    let mut text = DeviceData::new();
    text.insert("temperature".to_string(), PointValue::from("sensor fault"));
    let evaluation = engine
        .evaluate_reading("d1", &text, t0() + Duration::seconds(1))
        .expect("evaluate");
    assert!(evaluation.is_empty());
    assert_eq!(engine.active_alarms().expect("active").len(), 1);

    let missing = engine
        .evaluate_reading("d1", &reading("humidity", 1.0), t0() + Duration::seconds(2))
        .expect("evaluate");
    assert!(missing.is_empty());
}

#[tokio::test]
async fn status_rule_is_edge_triggered_and_clears_on_online() {
    let (engine, _) = engine_with(vec![rule(json!({
        "id": "r4",
        "deviceId": "d1",
        "type": "status",
        "severity": "critical",
        "cooldownPeriod": 0
    }))])
    .await;
    let offline = engine
        .evaluate_status("d1", DeviceStatus::Connecting, DeviceStatus::Offline, t0())
        .expect("evaluate");
    assert_eq!(offline.triggered.len(), 1);
    assert_eq!(offline.triggered[0].message, "r4: device d1 is offline");

    // offline -> error 不是新的边沿
    let error = engine
        .evaluate_status("d1", DeviceStatus::Offline, DeviceStatus::Error, t0())
        .expect("evaluate");
    assert!(error.triggered.is_empty());

    let online = engine
        .evaluate_status("d1", DeviceStatus::Error, DeviceStatus::Online, t0())
        .expect("evaluate");
    assert_eq!(online.cleared.len(), 1);
    assert!(engine.active_alarms().expect("active").is_empty());
}

#[tokio::test]
async fn acknowledge_removes_status_alarm() {
    let (engine, events) = engine_with(vec![rule(json!({
        "id": "r4",
        "deviceId": "d1",
        "type": "status"
    }))])
    .await;
    engine
        .evaluate_status("d1", DeviceStatus::Online, DeviceStatus::Error, t0())
        .expect("evaluate");
    let acknowledged = engine.acknowledge("r4").expect("ack");
    assert!(acknowledged.cleared);
    assert!(engine.active_alarms().expect("active").is_empty());
    assert_eq!(events.kinds(), vec!["alarmCleared"]);
    assert!(matches!(
        engine.acknowledge("r4"),
        Err(AlarmError::NotFound(_))
    ));
}

#[tokio::test]
async fn update_rejects_invalid_list_and_keeps_counters() {
    let store = Arc::new(InMemoryConfigStore::new());
    let repository = Arc::new(
        ConfigRepository::load(store.clone())
            .await
            .expect("repository"),
    );
    let events = Arc::new(RecordingEventSink::new());
    let engine = AlarmEngine::new(events.clone(), None, Some(repository));
    engine
        .update_alarms(vec![threshold_rule(60_000)])
        .await
        .expect("rules");
    engine
        .evaluate_reading("d1", &reading("temperature", 31.0), t0())
        .expect("evaluate");

    let invalid = rule(json!({
        "id": "bad",
        "deviceId": "d1",
        "type": "threshold",
        "value": 1
    }));
    let err = engine
        .update_alarms(vec![threshold_rule(60_000), invalid])
        .await
        .expect_err("invalid");
    assert!(matches!(err, AlarmError::Validation(ref errors) if errors.len() == 1));
    assert_eq!(engine.rules().expect("rules").len(), 1);

    // 客户端提交的计数被引擎状态覆盖
    let mut edited = threshold_rule(120_000);
    edited.trigger_count = 0;
    let rules = engine.update_alarms(vec![edited]).await.expect("rules");
    assert_eq!(rules[0].trigger_count, 1);
    assert_eq!(rules[0].cooldown_period_ms, 120_000);
    assert_eq!(engine.active_alarms().expect("active").len(), 1);

    let persisted = store.load().await.expect("load");
    assert_eq!(persisted.alarms.len(), 1);
    assert_eq!(persisted.alarms[0].trigger_count, 1);

    // 删除规则清除其活动告警
    engine.update_alarms(Vec::new()).await.expect("rules");
    assert!(engine.active_alarms().expect("active").is_empty());
    assert!(events.kinds().contains(&"alarmCleared"));
}

#[tokio::test]
async fn rejected_save_leaves_rules_and_alarms_untouched() {
    let repository = Arc::new(
        ConfigRepository::load(Arc::new(ReadOnlyConfigStore))
            .await
            .expect("repository"),
    );
    let events = Arc::new(RecordingEventSink::new());
    let engine = AlarmEngine::new(events.clone(), None, Some(repository));
    engine.load(vec![threshold_rule(60_000)]).expect("load");
    engine
        .evaluate_reading("d1", &reading("temperature", 35.0), t0())
        .expect("evaluate");

    let err = engine.update_alarms(Vec::new()).await.expect_err("save fails");
    assert!(matches!(err, AlarmError::Storage(_)));
    assert_eq!(engine.rules().expect("rules").len(), 1);
    assert_eq!(engine.active_alarms().expect("active").len(), 1);
    assert!(!events.kinds().contains(&"alarmCleared"));
}

#[tokio::test(start_paused = true)]
async fn trigger_during_rule_update_keeps_latest_rules() {
    let store = Arc::new(SlowConfigStore {
        inner: InMemoryConfigStore::new(),
        delay: std::time::Duration::from_millis(50),
    });
    let repository = Arc::new(
        ConfigRepository::load(store.clone())
            .await
            .expect("repository"),
    );
    let engine = AlarmEngine::new(Arc::new(RecordingEventSink::new()), None, Some(repository));
    engine.load(vec![threshold_rule(60_000)]).expect("load");

    let config: DeviceConfig = serde_json::from_value(json!({
        "id": "d1",
        "name": "Sensor",
        "protocol": "modbus",
        "host": "10.0.0.5",
        "points": [40001]
    }))
    .expect("config");
    let mut device = Device::new(config);
    device.last_data = reading("temperature", 35.0);
    device.last_updated = Some(t0());

    let mut replacement = threshold_rule(60_000);
    replacement.id = "r2".to_string();
    let (observed, updated) = tokio::join!(engine.on_reading(&device), async {
        tokio::task::yield_now().await;
        engine.update_alarms(vec![replacement]).await
    });
    observed.expect("reading");
    updated.expect("rules");

    let persisted = store.load().await.expect("load");
    let ids: Vec<&str> = persisted.alarms.iter().map(|rule| rule.id.as_str()).collect();
    assert_eq!(ids, vec!["r2"]);
    assert_eq!(engine.rules().expect("rules")[0].id, "r2");
}
