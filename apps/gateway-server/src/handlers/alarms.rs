//! 告警规则与活动告警 handlers
//!
//! - GET /api/alarms - 规则列表（含 triggerCount / lastTriggered）
//! - PUT /api/alarms - 整体替换规则列表
//! - GET /api/alarms/active - 活动告警
//! - POST /api/alarms/active/:alarm_id/acknowledge - 确认告警

use crate::AppState;
use crate::utils::response::alarm_error;
use api_contract::{AcknowledgeDto, ApiResponse};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::AlarmRule;

#[derive(serde::Deserialize)]
pub struct AlarmPath {
    alarm_id: String,
}

pub async fn list_alarms(State(state): State<AppState>) -> Response {
    match state.alarms.rules() {
        Ok(rules) => (StatusCode::OK, Json(ApiResponse::success(rules))).into_response(),
        Err(err) => alarm_error(err),
    }
}

/// 任一规则非法时整体拒绝，返回全部校验错误。
pub async fn update_alarms(
    State(state): State<AppState>,
    Json(rules): Json<Vec<AlarmRule>>,
) -> Response {
    match state.alarms.update_alarms(rules).await {
        Ok(rules) => (StatusCode::OK, Json(ApiResponse::success(rules))).into_response(),
        Err(err) => alarm_error(err),
    }
}

pub async fn list_active_alarms(State(state): State<AppState>) -> Response {
    match state.alarms.active_alarms() {
        Ok(alarms) => (StatusCode::OK, Json(ApiResponse::success(alarms))).into_response(),
        Err(err) => alarm_error(err),
    }
}

pub async fn acknowledge_alarm(
    State(state): State<AppState>,
    Path(path): Path<AlarmPath>,
) -> Response {
    match state.alarms.acknowledge(&path.alarm_id) {
        Ok(alarm) => (
            StatusCode::OK,
            Json(ApiResponse::success(AcknowledgeDto {
                alarm_id: alarm.alarm_id,
                cleared: alarm.cleared,
            })),
        )
            .into_response(),
        Err(err) => alarm_error(err),
    }
}
