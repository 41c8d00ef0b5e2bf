use domain::{DeviceConfig, HistoryLogger};
use gateway_storage::{ConfigRepository, ConfigStore, FileConfigStore, GatewayConfigDocument};
use serde_json::json;
use std::sync::Arc;

fn device() -> DeviceConfig {
    serde_json::from_value(json!({
        "id": "d1",
        "name": "Sensor",
        "protocol": "modbus",
        "host": "10.0.0.5",
        "points": [40001]
    }))
    .expect("device")
}

#[tokio::test]
async fn missing_file_loads_empty_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = FileConfigStore::new(dir.path().join("gateway.json"));
    let document = store.load().await.expect("load");
    assert_eq!(document, GatewayConfigDocument::default());
}

#[tokio::test]
async fn save_creates_parent_and_round_trips() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("gateway.json");
    let store = FileConfigStore::new(&path);

    let document = GatewayConfigDocument {
        devices: vec![device()],
        ..GatewayConfigDocument::default()
    };
    store.save(&document).await.expect("save");
    assert!(path.exists());
    assert!(!dir.path().join("nested").join("gateway.json.tmp").exists());

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
    assert_eq!(raw["devices"][0]["id"], "d1");
    assert!(raw["historyLoggers"].as_array().expect("array").is_empty());

    let loaded = store.load().await.expect("load");
    assert_eq!(loaded, document);
}

#[tokio::test]
async fn repository_serializes_updates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store: Arc<dyn ConfigStore> = Arc::new(FileConfigStore::new(dir.path().join("c.json")));
    let repository = ConfigRepository::load(store.clone()).await.expect("load");

    repository
        .update(|doc| doc.devices.push(device()))
        .await
        .expect("update");
    let logger: HistoryLogger = serde_json::from_value(json!({
        "id": "h1",
        "deviceId": "d1",
        "dataPoints": ["register_40001"],
        "interval": 60000,
        "retentionDays": 7
    }))
    .expect("logger");
    repository
        .update(|doc| doc.history_loggers.push(logger))
        .await
        .expect("update");

    let persisted = store.load().await.expect("load");
    assert_eq!(persisted.devices.len(), 1);
    assert_eq!(persisted.history_loggers.len(), 1);
    assert_eq!(repository.snapshot().await, persisted);
}
