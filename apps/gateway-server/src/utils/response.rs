//! HTTP 错误响应辅助函数
//!
//! 各能力模块的错误在这里映射为统一的 `ApiResponse` 错误体：
//! - `VALIDATION.INVALID` → 400
//! - `RESOURCE.NOT_FOUND` → 404
//! - `RESOURCE.CONFLICT` → 409
//! - `UPSTREAM.TIMEOUT` → 504，`UPSTREAM.UNAVAILABLE` → 503
//! - `INTERNAL.ERROR` → 500

use api_contract::ApiResponse;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gateway_alarm::AlarmError;
use gateway_events::RequestError;
use gateway_history::HistoryError;
use gateway_scheduler::SchedulerError;
use gateway_storage::StorageError;
use tracing::warn;

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::error(code, message.into()))).into_response()
}

pub fn bad_request_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, "VALIDATION.INVALID", message)
}

pub fn not_found_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::NOT_FOUND, "RESOURCE.NOT_FOUND", message)
}

pub fn conflict_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::CONFLICT, "RESOURCE.CONFLICT", message)
}

pub fn upstream_timeout_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::GATEWAY_TIMEOUT, "UPSTREAM.TIMEOUT", message)
}

pub fn upstream_unavailable_error(message: impl Into<String>) -> Response {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "UPSTREAM.UNAVAILABLE",
        message,
    )
}

pub fn internal_error(message: impl Into<String>) -> Response {
    let message = message.into();
    warn!(target: "gateway.server", error = %message, "request_failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL.ERROR", message)
}

pub fn storage_error(err: StorageError) -> Response {
    internal_error(err.to_string())
}

pub fn scheduler_error(err: SchedulerError) -> Response {
    match err {
        SchedulerError::InvalidConfig(_) => bad_request_error(err.to_string()),
        SchedulerError::NotFound(_) => not_found_error(err.to_string()),
        SchedulerError::Duplicate(_) => conflict_error(err.to_string()),
        SchedulerError::Storage(_) | SchedulerError::Observer(_) => internal_error(err.to_string()),
    }
}

pub fn alarm_error(err: AlarmError) -> Response {
    match err {
        AlarmError::Validation(_) => bad_request_error(err.to_string()),
        AlarmError::NotFound(_) => not_found_error(err.to_string()),
        AlarmError::Storage(_) | AlarmError::State(_) => internal_error(err.to_string()),
    }
}

pub fn history_error(err: HistoryError) -> Response {
    match err {
        HistoryError::Validation(_) => bad_request_error(err.to_string()),
        HistoryError::NotFound(_) => not_found_error(err.to_string()),
        HistoryError::Storage(_) | HistoryError::Export(_) => internal_error(err.to_string()),
    }
}

pub fn request_error(err: RequestError) -> Response {
    match err {
        RequestError::Timeout(_) => upstream_timeout_error(err.to_string()),
        RequestError::Cancelled | RequestError::Unavailable(_) => {
            upstream_unavailable_error(err.to_string())
        }
    }
}
