use crate::AlarmError;
use crate::message::{reading_message, status_message};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ActiveAlarm, AlarmRule, AlarmType, Device, DeviceData, DeviceStatus,
    PointValue, RuleError, now_utc,
};
use gateway_events::{EmailAction, EmailNotifier, EventSink, GatewayEvent};
use gateway_scheduler::{PollObserver, SchedulerError};
use gateway_storage::ConfigRepository;
use gateway_telemetry::{record_alarm_cleared, record_alarm_triggered};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// 一次评估产生的变化。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub triggered: Vec<ActiveAlarm>,
    pub refreshed: Vec<ActiveAlarm>,
    pub cleared: Vec<ActiveAlarm>,
}

impl Evaluation {
    pub fn is_empty(&self) -> bool {
        self.triggered.is_empty() && self.refreshed.is_empty() && self.cleared.is_empty()
    }
}

#[derive(Default)]
struct EngineState {
    rules: Vec<AlarmRule>,
    /// rule id -> 活动告警
    active: HashMap<String, ActiveAlarm>,
    /// (device id, data key) -> 上一次数值，供 change 规则使用
    previous: HashMap<(String, String), f64>,
}

pub struct AlarmEngine {
    state: Mutex<EngineState>,
    /// 规则快照与落盘必须成对执行，否则旧快照可能覆盖新列表
    persist_lock: tokio::sync::Mutex<()>,
    events: Arc<dyn EventSink>,
    notifier: Option<Arc<dyn EmailNotifier>>,
    repository: Option<Arc<ConfigRepository>>,
}

impl AlarmEngine {
    pub fn new(
        events: Arc<dyn EventSink>,
        notifier: Option<Arc<dyn EmailNotifier>>,
        repository: Option<Arc<ConfigRepository>>,
    ) -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            persist_lock: tokio::sync::Mutex::new(()),
            events,
            notifier,
            repository,
        }
    }

    /// 启动时加载已持久化的规则；非法规则跳过并记录日志。
    pub fn load(&self, rules: Vec<AlarmRule>) -> Result<usize, AlarmError> {
        let mut valid = Vec::with_capacity(rules.len());
        for rule in rules {
            match rule.validate() {
                Ok(()) => valid.push(rule),
                Err(err) => {
                    warn!(target: "gateway.alarm", rule_id = %rule.id, error = %err, "rule_load_skipped")
                }
            }
        }
        let count = valid.len();
        self.lock()?.rules = valid;
        Ok(count)
    }

    pub fn rules(&self) -> Result<Vec<AlarmRule>, AlarmError> {
        Ok(self.lock()?.rules.clone())
    }

    /// 活动告警，按触发时间排序。
    pub fn active_alarms(&self) -> Result<Vec<ActiveAlarm>, AlarmError> {
        let state = self.lock()?;
        let mut alarms: Vec<ActiveAlarm> = state.active.values().cloned().collect();
        alarms.sort_by(|a, b| {
            a.triggered_at
                .cmp(&b.triggered_at)
                .then_with(|| a.alarm_id.cmp(&b.alarm_id))
        });
        Ok(alarms)
    }

    /// 整体替换规则列表；任一规则非法则全部拒绝。
    ///
    /// 先落盘，成功后才在内存中生效。保留规则沿用引擎内的
    /// `triggerCount` / `lastTriggered`；被删除或禁用的规则对应的活动告警被清除。
    pub async fn update_alarms(&self, rules: Vec<AlarmRule>) -> Result<Vec<AlarmRule>, AlarmError> {
        validate_all(&rules)?;
        let _persist = self.persist_lock.lock().await;
        let candidate = {
            let state = self.lock()?;
            carry_counters(&state.rules, rules)
        };
        self.persist(&candidate).await?;

        let (rules, cleared) = {
            let mut state = self.lock()?;
            let merged = carry_counters(&state.rules, candidate);
            let keep: HashSet<&str> = merged
                .iter()
                .filter(|rule| rule.enabled)
                .map(|rule| rule.id.as_str())
                .collect();
            let stale: Vec<String> = state
                .active
                .keys()
                .filter(|id| !keep.contains(id.as_str()))
                .cloned()
                .collect();
            let cleared: Vec<ActiveAlarm> = stale
                .iter()
                .filter_map(|id| state.active.remove(id))
                .map(into_cleared)
                .collect();
            state.rules = merged.clone();
            (merged, cleared)
        };
        info!(
            target: "gateway.alarm",
            rules = rules.len(),
            cleared = cleared.len(),
            "alarm_rules_updated"
        );
        self.publish(&Evaluation {
            cleared,
            ..Evaluation::default()
        });
        Ok(rules)
    }

    /// 确认并移除活动告警。
    pub fn acknowledge(&self, alarm_id: &str) -> Result<ActiveAlarm, AlarmError> {
        let alarm = self
            .lock()?
            .active
            .remove(alarm_id)
            .map(into_cleared)
            .ok_or_else(|| AlarmError::NotFound(alarm_id.to_string()))?;
        info!(target: "gateway.alarm", alarm_id = %alarm_id, "alarm_acknowledged");
        self.publish(&Evaluation {
            cleared: vec![alarm.clone()],
            ..Evaluation::default()
        });
        Ok(alarm)
    }

    /// 设备删除：丢弃变化量跟踪状态并清除其活动告警。
    pub fn remove_device(&self, device_id: &str) -> Result<Vec<ActiveAlarm>, AlarmError> {
        let cleared = {
            let mut state = self.lock()?;
            state.previous.retain(|(device, _), _| device != device_id);
            let ids: Vec<String> = state
                .active
                .values()
                .filter(|alarm| alarm.device_id == device_id)
                .map(|alarm| alarm.alarm_id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| state.active.remove(id))
                .map(into_cleared)
                .collect::<Vec<_>>()
        };
        self.publish(&Evaluation {
            cleared: cleared.clone(),
            ..Evaluation::default()
        });
        Ok(cleared)
    }

    /// 评估一次读数（纯状态变更，不发事件）。
    pub fn evaluate_reading(
        &self,
        device_id: &str,
        data: &DeviceData,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, AlarmError> {
        let mut state = self.lock()?;
        let EngineState {
            rules,
            active,
            previous,
        } = &mut *state;
        let mut evaluation = Evaluation::default();

        for rule in rules.iter_mut() {
            if !rule.enabled || rule.device_id != device_id || rule.alarm_type == AlarmType::Status
            {
                continue;
            }
            let Ok(condition) = rule.condition() else {
                continue;
            };
            let Some(key) = rule.data_key.clone() else {
                continue;
            };
            let Some(value) = data.get(&key) else {
                continue;
            };
            let Some(number) = value.as_f64() else {
                debug!(target: "gateway.alarm", rule_id = %rule.id, key = %key, "non_numeric_value_skipped");
                continue;
            };
            let prev = previous.get(&(device_id.to_string(), key.clone())).copied();

            if condition.holds(number, prev) {
                let message = reading_message(rule, &condition, &key, number, prev);
                apply_hold(
                    rule,
                    active,
                    &mut evaluation,
                    device_id,
                    Some(key),
                    Some(value.clone()),
                    message,
                    now,
                );
            } else if let Some(alarm) = active.remove(&rule.id) {
                evaluation.cleared.push(into_cleared(alarm));
            }
        }

        for (key, value) in data {
            if let Some(number) = value.as_f64() {
                previous.insert((device_id.to_string(), key.clone()), number);
            }
        }
        Ok(evaluation)
    }

    /// 评估设备状态变化：进入 offline/error 时触发，恢复 online 时清除。
    pub fn evaluate_status(
        &self,
        device_id: &str,
        previous_status: DeviceStatus,
        status: DeviceStatus,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, AlarmError> {
        let mut state = self.lock()?;
        let EngineState { rules, active, .. } = &mut *state;
        let mut evaluation = Evaluation::default();
        let entered_fault = status.is_faulted() && !previous_status.is_faulted();

        for rule in rules.iter_mut() {
            if !rule.enabled || rule.device_id != device_id || rule.alarm_type != AlarmType::Status
            {
                continue;
            }
            if entered_fault {
                let message = status_message(rule, device_id, status);
                let value = Some(PointValue::from(status.as_str()));
                let key = rule.data_key.clone();
                apply_hold(
                    rule,
                    active,
                    &mut evaluation,
                    device_id,
                    key,
                    value,
                    message,
                    now,
                );
            } else if status == DeviceStatus::Online {
                if let Some(alarm) = active.remove(&rule.id) {
                    evaluation.cleared.push(into_cleared(alarm));
                }
            }
        }
        Ok(evaluation)
    }

    /// 评估后的副作用：推送事件、转发邮件、持久化规则计数。
    async fn commit(&self, evaluation: Evaluation) {
        if evaluation.is_empty() {
            return;
        }
        self.publish(&evaluation);
        if evaluation.triggered.is_empty() {
            return;
        }
        let _persist = self.persist_lock.lock().await;
        let rules = match self.rules() {
            Ok(rules) => rules,
            Err(err) => {
                warn!(target: "gateway.alarm", error = %err, "rules_snapshot_failed");
                return;
            }
        };
        self.forward_emails(&rules, &evaluation.triggered);
        if let Err(err) = self.persist(&rules).await {
            warn!(target: "gateway.alarm", error = %err, "rule_state_persist_failed");
        }
    }

    fn publish(&self, evaluation: &Evaluation) {
        for alarm in &evaluation.triggered {
            record_alarm_triggered();
            info!(
                target: "gateway.alarm",
                alarm_id = %alarm.alarm_id,
                device_id = %alarm.device_id,
                severity = %alarm.severity,
                message = %alarm.message,
                "alarm_triggered"
            );
            self.events.publish(GatewayEvent::AlarmTriggered(alarm.clone()));
        }
        for alarm in &evaluation.cleared {
            record_alarm_cleared();
            info!(
                target: "gateway.alarm",
                alarm_id = %alarm.alarm_id,
                device_id = %alarm.device_id,
                "alarm_cleared"
            );
            self.events.publish(GatewayEvent::AlarmCleared(alarm.clone()));
        }
    }

    fn forward_emails(&self, rules: &[AlarmRule], triggered: &[ActiveAlarm]) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        for alarm in triggered {
            let Some(rule) = rules.iter().find(|rule| rule.id == alarm.alarm_id) else {
                continue;
            };
            if !rule.email_notification {
                continue;
            }
            let payload = serde_json::json!({
                "ruleName": rule.display_name(),
                "alarm": alarm,
            });
            let notifier = notifier.clone();
            let alarm_id = alarm.alarm_id.clone();
            tokio::spawn(async move {
                match notifier
                    .request(EmailAction::SendAlarmNotification, payload)
                    .await
                {
                    Ok(result) => {
                        debug!(target: "gateway.alarm", alarm_id = %alarm_id, result = %result, "alarm_email_sent")
                    }
                    Err(err) => {
                        warn!(target: "gateway.alarm", alarm_id = %alarm_id, error = %err, "alarm_email_failed")
                    }
                }
            });
        }
    }

    async fn persist(&self, rules: &[AlarmRule]) -> Result<(), AlarmError> {
        let Some(repository) = &self.repository else {
            return Ok(());
        };
        let rules = rules.to_vec();
        repository
            .update(move |document| document.alarms = rules)
            .await
            .map_err(|err| AlarmError::Storage(err.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>, AlarmError> {
        self.state
            .lock()
            .map_err(|_| AlarmError::State("lock failed".to_string()))
    }
}

/// 按 id 沿用已有规则的触发计数与最近触发时间。
fn carry_counters(existing: &[AlarmRule], rules: Vec<AlarmRule>) -> Vec<AlarmRule> {
    let existing: HashMap<&str, &AlarmRule> =
        existing.iter().map(|rule| (rule.id.as_str(), rule)).collect();
    rules
        .into_iter()
        .map(|mut rule| {
            if let Some(current) = existing.get(rule.id.as_str()) {
                rule.last_triggered = current.last_triggered;
                rule.trigger_count = current.trigger_count;
            }
            rule
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn apply_hold(
    rule: &mut AlarmRule,
    active: &mut HashMap<String, ActiveAlarm>,
    evaluation: &mut Evaluation,
    device_id: &str,
    data_key: Option<String>,
    value: Option<PointValue>,
    message: String,
    now: DateTime<Utc>,
) {
    if let Some(alarm) = active.get_mut(&rule.id) {
        alarm.value = value;
        alarm.message = message;
        alarm.updated_at = now;
        evaluation.refreshed.push(alarm.clone());
        return;
    }
    if !rule.cooldown_elapsed(now) {
        debug!(target: "gateway.alarm", rule_id = %rule.id, "alarm_suppressed_cooldown");
        return;
    }
    rule.last_triggered = Some(now);
    rule.trigger_count = rule.trigger_count.saturating_add(1);
    let alarm = ActiveAlarm {
        alarm_id: rule.id.clone(),
        device_id: device_id.to_string(),
        data_key,
        severity: rule.severity,
        triggered_at: now,
        updated_at: now,
        message,
        value,
        cleared: false,
    };
    active.insert(rule.id.clone(), alarm.clone());
    evaluation.triggered.push(alarm);
}

fn into_cleared(mut alarm: ActiveAlarm) -> ActiveAlarm {
    alarm.cleared = true;
    alarm
}

fn validate_all(rules: &[AlarmRule]) -> Result<(), AlarmError> {
    let mut errors: Vec<RuleError> = Vec::new();
    let mut seen = HashSet::new();
    for rule in rules {
        if let Err(err) = rule.validate() {
            errors.push(err);
        }
        if !seen.insert(rule.id.as_str()) {
            errors.push(RuleError::Invalid {
                rule_id: rule.id.clone(),
                reason: "duplicate rule id".to_string(),
            });
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.into())
    }
}

#[async_trait]
impl PollObserver for AlarmEngine {
    fn name(&self) -> &'static str {
        "alarm"
    }

    async fn on_reading(&self, device: &Device) -> Result<(), SchedulerError> {
        let now = device.last_updated.unwrap_or_else(now_utc);
        let evaluation = self
            .evaluate_reading(device.id(), &device.last_data, now)
            .map_err(|err| SchedulerError::Observer(err.to_string()))?;
        self.commit(evaluation).await;
        Ok(())
    }

    async fn on_status_change(
        &self,
        device: &Device,
        previous: DeviceStatus,
    ) -> Result<(), SchedulerError> {
        let evaluation = self
            .evaluate_status(device.id(), previous, device.status, now_utc())
            .map_err(|err| SchedulerError::Observer(err.to_string()))?;
        self.commit(evaluation).await;
        Ok(())
    }

    async fn on_device_removed(&self, device_id: &str) -> Result<(), SchedulerError> {
        self.remove_device(device_id)
            .map_err(|err| SchedulerError::Observer(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::AlarmCondition;
    use gateway_events::NoopEventSink;

    #[test]
    fn status_condition_never_holds_numerically() {
        assert!(!AlarmCondition::Status.holds(1.0, Some(0.0)));
    }

    #[test]
    fn duplicate_rule_ids_are_rejected() {
        let rule: AlarmRule = serde_json::from_value(serde_json::json!({
            "id": "r1",
            "deviceId": "d1",
            "type": "status"
        }))
        .expect("rule");
        let err = validate_all(&[rule.clone(), rule]).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate rule id"));
    }

    #[test]
    fn acknowledge_unknown_alarm_fails() {
        let engine = AlarmEngine::new(Arc::new(NoopEventSink), None, None);
        assert!(matches!(
            engine.acknowledge("missing"),
            Err(AlarmError::NotFound(_))
        ));
    }
}
