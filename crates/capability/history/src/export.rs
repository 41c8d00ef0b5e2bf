//! 导出格式

use crate::HistoryError;
use chrono::{DateTime, SecondsFormat, Utc};
use domain::{DeviceData, HistoryRecord, PointValue};
use serde::Serialize;

#[derive(Serialize)]
struct ExportRecord<'a> {
    timestamp: String,
    data: &'a DeviceData,
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `[{timestamp, data}]`，可直接反序列化回 `HistoryRecord`。
pub fn export_json(records: &[HistoryRecord]) -> Result<Vec<u8>, HistoryError> {
    let rows: Vec<ExportRecord<'_>> = records
        .iter()
        .map(|record| ExportRecord {
            timestamp: format_timestamp(record.timestamp),
            data: &record.data,
        })
        .collect();
    serde_json::to_vec_pretty(&rows).map_err(|err| HistoryError::Export(err.to_string()))
}

/// 列为 `timestamp,<dataPoints...>`，缺失值留空。
pub fn export_csv(data_points: &[String], records: &[HistoryRecord]) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("timestamp");
    for point in data_points {
        out.push(',');
        out.push_str(&escape(point));
    }
    out.push('\n');
    for record in records {
        out.push_str(&format_timestamp(record.timestamp));
        for point in data_points {
            out.push(',');
            if let Some(value) = record.data.get(point) {
                out.push_str(&escape(&cell(value)));
            }
        }
        out.push('\n');
    }
    out.into_bytes()
}

fn cell(value: &PointValue) -> String {
    value.to_string()
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_special_fields() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("two\nlines"), "\"two\nlines\"");
    }
}
