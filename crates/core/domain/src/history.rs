//! 历史记录器模型

use crate::value::DeviceData;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LoggerError {
    #[error("logger {logger_id}: {field} is required")]
    Missing {
        logger_id: String,
        field: &'static str,
    },
    #[error("logger {logger_id}: {reason}")]
    Invalid { logger_id: String, reason: String },
}

fn default_true() -> bool {
    true
}

/// 保留期上限（天）。
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryLogger {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub device_id: String,
    pub data_points: Vec<String>,
    #[serde(rename = "interval")]
    pub interval_ms: u64,
    pub retention_days: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl HistoryLogger {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn validate(&self) -> Result<(), LoggerError> {
        let missing = |field| LoggerError::Missing {
            logger_id: self.id.clone(),
            field,
        };
        let invalid = |reason: &str| LoggerError::Invalid {
            logger_id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(missing("id"));
        }
        if self.device_id.trim().is_empty() {
            return Err(missing("deviceId"));
        }
        if self.data_points.is_empty() {
            return Err(missing("dataPoints"));
        }
        let mut seen = HashSet::new();
        for point in &self.data_points {
            if point.trim().is_empty() {
                return Err(invalid("dataPoints must not contain empty keys"));
            }
            if !seen.insert(point.as_str()) {
                return Err(invalid("dataPoints must not contain duplicates"));
            }
        }
        if self.interval_ms == 0 {
            return Err(invalid("interval must be positive"));
        }
        if self.retention_days == 0 {
            return Err(invalid("retentionDays must be positive"));
        }
        if self.retention_days > MAX_RETENTION_DAYS {
            return Err(invalid("retentionDays exceeds 36500"));
        }
        Ok(())
    }

    /// 将设备最新数据投影到 dataPoints；只保留实际存在的键。
    pub fn project(&self, latest: &DeviceData) -> DeviceData {
        self.data_points
            .iter()
            .filter_map(|key| latest.get(key).map(|value| (key.clone(), value.clone())))
            .collect()
    }
}

/// 历史记录（追加写入，按记录器归属）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub data: DeviceData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggerStats {
    pub logger_id: String,
    pub record_count: u64,
    pub oldest_timestamp: Option<DateTime<Utc>>,
    pub newest_timestamp: Option<DateTime<Utc>>,
}

impl LoggerStats {
    pub fn empty(logger_id: impl Into<String>) -> Self {
        Self {
            logger_id: logger_id.into(),
            record_count: 0,
            oldest_timestamp: None,
            newest_timestamp: None,
        }
    }
}

/// 导出格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}
