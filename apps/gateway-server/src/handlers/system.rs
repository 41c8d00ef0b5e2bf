//! 健康检查与计数器快照
//!
//! - GET /health
//! - GET /metrics

use api_contract::{ApiResponse, HealthDto, MetricsSnapshotDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gateway_telemetry::metrics;

pub async fn health() -> Response {
    (StatusCode::OK, Json(ApiResponse::success(HealthDto { status: "ok" }))).into_response()
}

pub async fn get_metrics() -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            polls_succeeded: snapshot.polls_succeeded,
            polls_failed: snapshot.polls_failed,
            polls_skipped: snapshot.polls_skipped,
            poll_latency_ms_total: snapshot.poll_latency_ms_total,
            poll_latency_ms_count: snapshot.poll_latency_ms_count,
            mqtt_published: snapshot.mqtt_published,
            mqtt_dropped: snapshot.mqtt_dropped,
            alarms_triggered: snapshot.alarms_triggered,
            alarms_cleared: snapshot.alarms_cleared,
            history_written: snapshot.history_written,
            history_write_failed: snapshot.history_write_failed,
            history_pruned: snapshot.history_pruned,
            events_dropped: snapshot.events_dropped,
        })),
    )
        .into_response()
}
