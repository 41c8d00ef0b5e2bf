//! 推送消息结构

use domain::{ActiveAlarm, Device, LoggerStats};
use serde::{Deserialize, Serialize};

/// 推送给 UI 与协作方的事件，序列化为 `{type, data}`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayEvent {
    DeviceUpdate(Device),
    AlarmTriggered(ActiveAlarm),
    AlarmCleared(ActiveAlarm),
    HistoryStatsChanged(LoggerStats),
    EmailRequest(EmailRequest),
}

impl GatewayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayEvent::DeviceUpdate(_) => "deviceUpdate",
            GatewayEvent::AlarmTriggered(_) => "alarmTriggered",
            GatewayEvent::AlarmCleared(_) => "alarmCleared",
            GatewayEvent::HistoryStatsChanged(_) => "historyStatsChanged",
            GatewayEvent::EmailRequest(_) => "emailRequest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EmailAction {
    TestEmailConnection,
    SendTestEmail,
    SendAlarmNotification,
}

impl EmailAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailAction::TestEmailConnection => "testEmailConnection",
            EmailAction::SendTestEmail => "sendTestEmail",
            EmailAction::SendAlarmNotification => "sendAlarmNotification",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    pub correlation_id: String,
    pub action: EmailAction,
    pub payload: serde_json::Value,
}

/// 协作方经推送通道发回的消息。
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    /// 连接声明自己是邮件通知方
    EmailNotifierReady,
    EmailResponse {
        correlation_id: String,
        #[serde(default)]
        result: serde_json::Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stats_event_is_type_and_data() {
        let event = GatewayEvent::HistoryStatsChanged(LoggerStats::empty("h1"));
        let value = serde_json::to_value(&event).expect("json");
        assert_eq!(value["type"], "historyStatsChanged");
        assert_eq!(value["data"]["loggerId"], "h1");
        assert_eq!(value["data"]["recordCount"], 0);
        assert_eq!(event.kind(), "historyStatsChanged");
    }

    #[test]
    fn email_request_shape() {
        let event = GatewayEvent::EmailRequest(EmailRequest {
            correlation_id: "c1".to_string(),
            action: EmailAction::SendTestEmail,
            payload: json!({"to": "ops@example.com"}),
        });
        let value = serde_json::to_value(&event).expect("json");
        assert_eq!(
            value,
            json!({
                "type": "emailRequest",
                "data": {
                    "correlationId": "c1",
                    "action": "sendTestEmail",
                    "payload": {"to": "ops@example.com"}
                }
            })
        );
    }

    #[test]
    fn parses_email_response() {
        let message: InboundMessage = serde_json::from_value(json!({
            "type": "emailResponse",
            "correlationId": "c1",
            "result": {"success": true}
        }))
        .expect("inbound");
        assert_eq!(
            message,
            InboundMessage::EmailResponse {
                correlation_id: "c1".to_string(),
                result: json!({"success": true}),
            }
        );
    }

    #[test]
    fn parses_notifier_ready() {
        let message: InboundMessage =
            serde_json::from_value(json!({"type": "emailNotifierReady"})).expect("inbound");
        assert_eq!(message, InboundMessage::EmailNotifierReady);
    }
}
