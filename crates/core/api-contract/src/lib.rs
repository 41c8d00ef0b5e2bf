//! 稳定的 DTO 与 API 响应契约。

use chrono::{DateTime, Utc};
use domain::{ExportFormat, HistoryRecord};
use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 健康检查返回结构。
#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: &'static str,
}

/// 历史数据查询参数（`getHistoryData`）。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQueryParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// 历史数据导出参数（`exportHistoryData`）。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExportParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub format: ExportFormat,
}

/// 历史数据返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDataDto {
    pub logger_id: String,
    pub records: Vec<HistoryRecord>,
}

/// 手动轮询结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollOutcomeDto {
    Succeeded,
    Failed,
    Skipped,
}

/// 手动轮询返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollNowDto {
    pub device_id: String,
    pub outcome: PollOutcomeDto,
}

/// BACnet 发现请求体。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverRequest {
    pub timeout_seconds: Option<u64>,
    pub target: Option<String>,
}

/// I-Am 应答返回结构。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDeviceDto {
    pub device_id: u32,
    pub address: String,
    pub max_apdu: u32,
    pub segmentation: u8,
    pub vendor_id: u32,
}

/// 告警确认返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeDto {
    pub alarm_id: String,
    pub cleared: bool,
}

/// 计数器快照返回结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub polls_succeeded: u64,
    pub polls_failed: u64,
    pub polls_skipped: u64,
    pub poll_latency_ms_total: u64,
    pub poll_latency_ms_count: u64,
    pub mqtt_published: u64,
    pub mqtt_dropped: u64,
    pub alarms_triggered: u64,
    pub alarms_cleared: u64,
    pub history_written: u64,
    pub history_write_failed: u64,
    pub history_pruned: u64,
    pub events_dropped: u64,
}
