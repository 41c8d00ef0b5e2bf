use domain::{AlarmCondition, AlarmRule, DeviceStatus};

fn number(value: f64) -> String {
    // 整数值不带小数点
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

pub(crate) fn reading_message(
    rule: &AlarmRule,
    condition: &AlarmCondition,
    key: &str,
    value: f64,
    previous: Option<f64>,
) -> String {
    let name = rule.display_name();
    match *condition {
        AlarmCondition::Threshold {
            operator,
            value: limit,
        } => format!(
            "{}: {} = {} ({} {})",
            name,
            key,
            number(value),
            operator.symbol(),
            number(limit)
        ),
        AlarmCondition::Range { min, max } => format!(
            "{}: {} = {} outside [{}, {}]",
            name,
            key,
            number(value),
            number(min),
            number(max)
        ),
        AlarmCondition::Change { amount } => format!(
            "{}: {} changed from {} to {} (>= {})",
            name,
            key,
            previous.map(number).unwrap_or_else(|| "-".to_string()),
            number(value),
            number(amount)
        ),
        AlarmCondition::Status => format!("{}: {} = {}", name, key, number(value)),
    }
}

pub(crate) fn status_message(rule: &AlarmRule, device_id: &str, status: DeviceStatus) -> String {
    format!("{}: device {} is {}", rule.display_name(), device_id, status)
}
