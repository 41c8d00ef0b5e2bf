//! 告警规则与活动告警模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_COOLDOWN_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule {rule_id}: {field} is required")]
    Missing { rule_id: String, field: &'static str },
    #[error("rule {rule_id}: {reason}")]
    Invalid { rule_id: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmType {
    Threshold,
    Range,
    Change,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOperator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl ComparisonOperator {
    pub fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            ComparisonOperator::Gt => left > right,
            ComparisonOperator::Gte => left >= right,
            ComparisonOperator::Lt => left < right,
            ComparisonOperator::Lte => left <= right,
            ComparisonOperator::Eq => left == right,
            ComparisonOperator::Ne => left != right,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
            ComparisonOperator::Eq => "==",
            ComparisonOperator::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_MS
}

/// 告警规则。
///
/// `trigger_count` / `last_triggered` 只由告警引擎修改；
/// 配置更新时这两个字段会从引擎已有状态中保留。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmRule {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_key: Option<String>,
    #[serde(rename = "type")]
    pub alarm_type: AlarmType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<ComparisonOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_amount: Option<f64>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "cooldownPeriod", default = "default_cooldown")]
    pub cooldown_period_ms: u64,
    #[serde(default)]
    pub email_notification: bool,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_count: u64,
}

/// 规则条件（校验后的强类型视图）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlarmCondition {
    Threshold {
        operator: ComparisonOperator,
        value: f64,
    },
    Range {
        min: f64,
        max: f64,
    },
    Change {
        amount: f64,
    },
    Status,
}

impl AlarmCondition {
    /// 数值类条件是否成立；状态类条件不在此判定。
    pub fn holds(&self, value: f64, previous: Option<f64>) -> bool {
        match *self {
            AlarmCondition::Threshold { operator, value: limit } => operator.apply(value, limit),
            AlarmCondition::Range { min, max } => value < min || value > max,
            AlarmCondition::Change { amount } => {
                previous.is_some_and(|prev| (value - prev).abs() >= amount)
            }
            AlarmCondition::Status => false,
        }
    }
}

impl AlarmRule {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.cooldown_period_ms).unwrap_or(i64::MAX))
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// 冷却期是否已过（从未触发视为已过）。
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.cooldown(),
        }
    }

    fn missing(&self, field: &'static str) -> RuleError {
        RuleError::Missing {
            rule_id: self.id.clone(),
            field,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> RuleError {
        RuleError::Invalid {
            rule_id: self.id.clone(),
            reason: reason.into(),
        }
    }

    /// 解析条件；缺字段或取值非法时返回错误。
    pub fn condition(&self) -> Result<AlarmCondition, RuleError> {
        if self.alarm_type != AlarmType::Status {
            let key = self.data_key.as_deref().unwrap_or("");
            if key.trim().is_empty() {
                return Err(self.missing("dataKey"));
            }
        }
        let finite = |value: Option<f64>, field: &'static str| -> Result<f64, RuleError> {
            let value = value.ok_or_else(|| self.missing(field))?;
            if !value.is_finite() {
                return Err(self.invalid(format!("{} must be finite", field)));
            }
            Ok(value)
        };
        match self.alarm_type {
            AlarmType::Threshold => {
                let operator = self.operator.ok_or_else(|| self.missing("operator"))?;
                let value = finite(self.value, "value")?;
                Ok(AlarmCondition::Threshold { operator, value })
            }
            AlarmType::Range => {
                let min = finite(self.min_value, "minValue")?;
                let max = finite(self.max_value, "maxValue")?;
                if min > max {
                    return Err(self.invalid("minValue must not exceed maxValue"));
                }
                Ok(AlarmCondition::Range { min, max })
            }
            AlarmType::Change => {
                let amount = finite(self.change_amount, "changeAmount")?;
                if amount <= 0.0 {
                    return Err(self.invalid("changeAmount must be positive"));
                }
                Ok(AlarmCondition::Change { amount })
            }
            AlarmType::Status => Ok(AlarmCondition::Status),
        }
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        if self.id.trim().is_empty() {
            return Err(self.missing("id"));
        }
        if self.device_id.trim().is_empty() {
            return Err(self.missing("deviceId"));
        }
        self.condition().map(|_| ())
    }
}

/// 活动告警（每条规则至多一个）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAlarm {
    pub alarm_id: String,
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_key: Option<String>,
    pub severity: Severity,
    pub triggered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message: String,
    pub value: Option<crate::PointValue>,
    pub cleared: bool,
}
