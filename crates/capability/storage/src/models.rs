//! 存储层数据模型

use chrono::{DateTime, Utc};
use domain::{AlarmRule, DeviceConfig, HistoryLogger};
use serde::{Deserialize, Serialize};

/// 持久化的网关配置文档（设备、告警规则、历史记录器）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigDocument {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default)]
    pub alarms: Vec<AlarmRule>,
    #[serde(default)]
    pub history_loggers: Vec<HistoryLogger>,
}

/// 历史记录查询条件（闭区间，limit 从最新一端截取）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| ts >= start) && self.end.is_none_or(|end| ts <= end)
    }
}
