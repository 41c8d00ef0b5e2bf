//! 设备 CRUD 与手动轮询 handlers
//!
//! - GET /api/devices - 列出设备（含实时状态）
//! - POST /api/devices - 新增设备并启动轮询
//! - PUT /api/devices/:device_id - 替换设备配置
//! - DELETE /api/devices/:device_id - 删除设备
//! - POST /api/devices/:device_id/poll - 立即轮询
//!
//! 每次变更成功后，设备列表写回配置文档；写回失败时撤销本次变更。

use crate::AppState;
use crate::utils::response::{bad_request_error, scheduler_error, storage_error};
use api_contract::{ApiResponse, PollNowDto, PollOutcomeDto};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{Device, DeviceConfig};
use gateway_scheduler::{PollOutcome, SchedulerError};
use tracing::warn;

#[derive(serde::Deserialize)]
pub struct DevicePath {
    device_id: String,
}

pub async fn list_devices(State(state): State<AppState>) -> Response {
    match state.scheduler.registry().list() {
        Ok(devices) => (StatusCode::OK, Json(ApiResponse::success(devices))).into_response(),
        Err(err) => storage_error(err),
    }
}

/// 新增设备
///
/// 配置非法返回 400，id 已存在返回 409。
pub async fn create_device(
    State(state): State<AppState>,
    Json(config): Json<DeviceConfig>,
) -> Response {
    let _writes = state.device_writes.lock().await;
    let device = match state.scheduler.add_device(config).await {
        Ok(device) => device,
        Err(err) => return scheduler_error(err),
    };
    if let Err(response) = persist_devices(&state).await {
        let undone = state.scheduler.remove_device(device.id()).await;
        log_rollback(device.id(), "create", undone);
        return response;
    }
    (StatusCode::OK, Json(ApiResponse::success(device))).into_response()
}

/// 替换设备配置
///
/// 请求体的 id 必须与路径一致。
pub async fn update_device(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    Json(config): Json<DeviceConfig>,
) -> Response {
    if config.id != path.device_id {
        return bad_request_error("device id does not match path");
    }
    let _writes = state.device_writes.lock().await;
    let previous = match state.scheduler.registry().get(&path.device_id) {
        Ok(previous) => previous,
        Err(err) => return storage_error(err),
    };
    let device = match state.scheduler.update_device(config).await {
        Ok(device) => device,
        Err(err) => return scheduler_error(err),
    };
    if let Err(response) = persist_devices(&state).await {
        if let Some(previous) = previous {
            let undone = state.scheduler.update_device(previous.config).await;
            log_rollback(device.id(), "update", undone);
        }
        return response;
    }
    (StatusCode::OK, Json(ApiResponse::success(device))).into_response()
}

pub async fn delete_device(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
) -> Response {
    let _writes = state.device_writes.lock().await;
    let device = match state.scheduler.remove_device(&path.device_id).await {
        Ok(device) => device,
        Err(err) => return scheduler_error(err),
    };
    if let Err(response) = persist_devices(&state).await {
        let undone = state.scheduler.add_device(device.config.clone()).await;
        log_rollback(device.id(), "delete", undone);
        return response;
    }
    (StatusCode::OK, Json(ApiResponse::success(device))).into_response()
}

pub async fn poll_device(State(state): State<AppState>, Path(path): Path<DevicePath>) -> Response {
    match state.scheduler.poll_now(&path.device_id).await {
        Ok(outcome) => {
            let outcome = match outcome {
                PollOutcome::Succeeded => PollOutcomeDto::Succeeded,
                PollOutcome::Failed => PollOutcomeDto::Failed,
                PollOutcome::Skipped => PollOutcomeDto::Skipped,
            };
            (
                StatusCode::OK,
                Json(ApiResponse::success(PollNowDto {
                    device_id: path.device_id,
                    outcome,
                })),
            )
                .into_response()
        }
        Err(err) => scheduler_error(err),
    }
}

async fn persist_devices(state: &AppState) -> Result<(), Response> {
    let configs = state
        .scheduler
        .registry()
        .configs()
        .map_err(storage_error)?;
    state
        .repository
        .update(move |document| document.devices = configs)
        .await
        .map_err(storage_error)
}

fn log_rollback(device_id: &str, action: &'static str, undone: Result<Device, SchedulerError>) {
    if let Err(err) = undone {
        warn!(
            target: "gateway.server",
            device_id = %device_id,
            action,
            error = %err,
            "device_rollback_failed"
        );
    }
}
