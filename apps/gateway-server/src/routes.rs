//! 路由定义
//!
//! 集中管理所有路由，将路径映射到对应的 handlers：
//! - 系统：/health, /metrics
//! - 设备：/api/devices/*
//! - 告警：/api/alarms/*
//! - 历史：/api/history-loggers, /api/history/*
//! - 邮件协作方：/api/email/*
//! - BACnet 发现：/api/bacnet/discover
//! - 推送通道：/ws

use crate::AppState;
use crate::handlers::*;
use crate::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .route("/api/devices", get(list_devices).post(create_device))
        .route(
            "/api/devices/:device_id",
            put(update_device).delete(delete_device),
        )
        .route("/api/devices/:device_id/poll", post(poll_device))
        .route("/api/alarms", get(list_alarms).put(update_alarms))
        .route("/api/alarms/active", get(list_active_alarms))
        .route(
            "/api/alarms/active/:alarm_id/acknowledge",
            post(acknowledge_alarm),
        )
        .route("/api/history-loggers", get(list_loggers).put(update_loggers))
        .route("/api/history/:logger_id/data", get(get_history_data))
        .route("/api/history/:logger_id/stats", get(get_logger_stats))
        .route("/api/history/:logger_id/export", get(export_history))
        .route("/api/email/test-connection", post(test_email_connection))
        .route("/api/email/send-test", post(send_test_email))
        .route("/api/bacnet/discover", post(discover_devices))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(middleware::from_fn(request_context))
        .layer(TraceLayer::new_for_http())
}
