//! 历史记录器 handlers
//!
//! - GET /api/history-loggers - 记录器列表
//! - PUT /api/history-loggers - 整体替换记录器列表
//! - GET /api/history/:logger_id/data - 按时间范围查询（start、end、limit）
//! - GET /api/history/:logger_id/stats - 记录数与时间跨度
//! - GET /api/history/:logger_id/export - 导出 JSON / CSV 文件
//!
//! 查询与导出受调用方时限约束，超时返回 `UPSTREAM.TIMEOUT`。

use crate::AppState;
use crate::utils::response::{history_error, upstream_timeout_error};
use api_contract::{ApiResponse, HistoryDataDto, HistoryExportParams, HistoryQueryParams};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use domain::HistoryLogger;
use gateway_history::HistoryError;
use gateway_storage::HistoryQuery;
use std::future::Future;

#[derive(serde::Deserialize)]
pub struct LoggerPath {
    logger_id: String,
}

pub async fn list_loggers(State(state): State<AppState>) -> Response {
    let loggers = state.history.loggers().await;
    (StatusCode::OK, Json(ApiResponse::success(loggers))).into_response()
}

pub async fn update_loggers(
    State(state): State<AppState>,
    Json(loggers): Json<Vec<HistoryLogger>>,
) -> Response {
    match state.history.update_loggers(loggers).await {
        Ok(loggers) => (StatusCode::OK, Json(ApiResponse::success(loggers))).into_response(),
        Err(err) => history_error(err),
    }
}

pub async fn get_history_data(
    State(state): State<AppState>,
    Path(path): Path<LoggerPath>,
    Query(params): Query<HistoryQueryParams>,
) -> Response {
    let query = HistoryQuery {
        start: params.start,
        end: params.end,
        limit: params.limit,
    };
    let result = bounded(&state, state.history.query(&path.logger_id, &query)).await;
    match result {
        Ok(records) => (
            StatusCode::OK,
            Json(ApiResponse::success(HistoryDataDto {
                logger_id: path.logger_id,
                records,
            })),
        )
            .into_response(),
        Err(response) => response,
    }
}

pub async fn get_logger_stats(
    State(state): State<AppState>,
    Path(path): Path<LoggerPath>,
) -> Response {
    match bounded(&state, state.history.stats(&path.logger_id)).await {
        Ok(stats) => (StatusCode::OK, Json(ApiResponse::success(stats))).into_response(),
        Err(response) => response,
    }
}

/// 返回原始文件内容而非 `ApiResponse` 封装。
pub async fn export_history(
    State(state): State<AppState>,
    Path(path): Path<LoggerPath>,
    Query(params): Query<HistoryExportParams>,
) -> Response {
    let export = state
        .history
        .export(&path.logger_id, params.start, params.end, params.format);
    match bounded(&state, export).await {
        Ok(body) => {
            let disposition = format!(
                "attachment; filename=\"{}.{}\"",
                path.logger_id,
                params.format.extension()
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, params.format.content_type().to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response()
        }
        Err(response) => response,
    }
}

async fn bounded<T>(
    state: &AppState,
    request: impl Future<Output = Result<T, HistoryError>>,
) -> Result<T, Response> {
    match tokio::time::timeout(state.request_timeout, request).await {
        Ok(result) => result.map_err(history_error),
        Err(_) => Err(upstream_timeout_error(format!(
            "history request exceeded {} ms",
            state.request_timeout.as_millis()
        ))),
    }
}
