//! 推送通道
//!
//! - GET /ws
//!
//! 出站：事件中心的每个事件序列化为 `{type, data}` 文本帧。
//! 入站：`emailNotifierReady` 把本连接登记为邮件通知方（断开时注销）；
//! `emailResponse` 按 correlationId 交还给等待中的请求。

use crate::AppState;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use gateway_events::{Correlator, InboundMessage, NotifierPresence, NotifierRegistration};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.hub.subscribe();
    info!(
        target: "gateway.ws",
        subscribers = state.hub.subscriber_count(),
        "ws_client_connected"
    );

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "gateway.ws", skipped, "ws_client_lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(target: "gateway.ws", kind = event.kind(), error = %err, "ws_encode_failed");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                debug!(target: "gateway.ws", "ws_send_failed");
                break;
            }
        }
    });

    let correlator = state.correlator.clone();
    let notifiers = state.notifiers.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut registration = None;
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    handle_inbound(&correlator, &notifiers, &mut registration, &text);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    info!(target: "gateway.ws", "ws_client_disconnected");
}

/// 处理一条入站文本帧；返回是否应答了等待中的请求。
fn handle_inbound(
    correlator: &Correlator,
    notifiers: &Arc<NotifierPresence>,
    registration: &mut Option<NotifierRegistration>,
    text: &str,
) -> bool {
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(InboundMessage::EmailNotifierReady) => {
            if registration.is_none() {
                *registration = Some(notifiers.register());
                info!(
                    target: "gateway.ws",
                    notifiers = notifiers.connected(),
                    "email_notifier_registered"
                );
            }
            false
        }
        Ok(InboundMessage::EmailResponse {
            correlation_id,
            result,
        }) => {
            let resolved = correlator.resolve(&correlation_id, result);
            if !resolved {
                debug!(target: "gateway.ws", correlation_id = %correlation_id, "ws_response_unmatched");
            }
            resolved
        }
        Err(err) => {
            debug!(target: "gateway.ws", error = %err, "ws_message_ignored");
            false
        }
    }
}
