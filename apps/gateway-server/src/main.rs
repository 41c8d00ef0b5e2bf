//! IoT 网关服务：设备轮询、MQTT 发布、告警、历史记录，以及 HTTP / WebSocket 接口。

mod handlers;
mod middleware;
mod observer;
mod routes;
mod state;
mod utils;


use gateway_config::AppConfig;
use gateway_publish::{MqttPublisher, MqttPublisherConfig};
use gateway_scheduler::ProtocolReaderFactory;
use gateway_storage::{
    ConfigRepository, FileConfigStore, HistoryStore, InMemoryHistoryStore, PgHistoryStore,
};
use gateway_telemetry::init_tracing;
use state::GatewayParts;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    // 配置文档：设备、告警规则、历史记录器
    let repository = Arc::new(
        ConfigRepository::load(Arc::new(FileConfigStore::new(&config.config_path))).await?,
    );
    let document = repository.snapshot().await;

    // 配置了数据库时历史记录写入 Postgres，否则只保存在内存
    let history_store: Arc<dyn HistoryStore> = match &config.database_url {
        Some(url) => Arc::new(PgHistoryStore::connect(url).await?),
        None => {
            warn!(target: "gateway.server", "history_store_in_memory");
            Arc::new(InMemoryHistoryStore::new())
        }
    };

    let (publisher, mqtt_task) = if config.mqtt.enabled {
        let (publisher, handle) = MqttPublisher::start(MqttPublisherConfig {
            host: config.mqtt.host.clone(),
            port: config.mqtt.port,
            username: config.mqtt.username.clone(),
            password: config.mqtt.password.clone(),
            client_id: config.mqtt.client_id.clone(),
            base_topic: config.mqtt.base_topic.clone(),
            qos: config.mqtt.qos,
        });
        (publisher, Some(handle))
    } else {
        info!(target: "gateway.server", "mqtt_disabled");
        (MqttPublisher::disabled(), None)
    };

    let state = AppState::assemble(
        &config,
        GatewayParts {
            repository,
            history_store,
            reader_factory: Arc::new(ProtocolReaderFactory),
            publisher,
        },
    );
    state.restore(document).await?;

    let maintenance_cancel = CancellationToken::new();
    let maintenance = state
        .history
        .spawn_maintenance(config.history_prune_interval(), maintenance_cancel.clone());

    let app = routes::create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "gateway.server", addr = %config.http_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    maintenance_cancel.cancel();
    let _ = maintenance.await;
    state.shutdown().await;
    if let Some(handle) = mqtt_task {
        handle.abort();
    }
    info!(target: "gateway.server", "gateway_stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "gateway.server", error = %err, "shutdown_signal_failed");
        std::future::pending::<()>().await;
    }
}
