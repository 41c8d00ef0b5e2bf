//! 邮件协作方转发 handlers
//!
//! - POST /api/email/test-connection
//! - POST /api/email/send-test
//!
//! 请求体原样作为 `emailRequest.payload` 推送，通知方结果原样返回。

use crate::AppState;
use crate::utils::response::request_error;
use api_contract::ApiResponse;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gateway_events::EmailAction;
use serde_json::Value;

pub async fn test_email_connection(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Response {
    forward(&state, EmailAction::TestEmailConnection, payload).await
}

pub async fn send_test_email(State(state): State<AppState>, Json(payload): Json<Value>) -> Response {
    forward(&state, EmailAction::SendTestEmail, payload).await
}

/// 没有已登记的通知方时立即返回 503。
async fn forward(state: &AppState, action: EmailAction, payload: Value) -> Response {
    match state.email.request(action, payload).await {
        Ok(result) => (StatusCode::OK, Json(ApiResponse::success(result))).into_response(),
        Err(err) => request_error(err),
    }
}
