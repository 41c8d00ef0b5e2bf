use api_contract::{ApiResponse, HistoryExportParams, HistoryQueryParams, PollNowDto, PollOutcomeDto};
use domain::ExportFormat;

#[test]
fn history_query_accepts_iso_timestamps() {
    let payload = r#"{"start":"2026-01-01T00:00:00Z","end":"2026-01-02T00:00:00.500Z","limit":100}"#;
    let params: HistoryQueryParams = serde_json::from_str(payload).expect("parse");
    assert_eq!(params.limit, Some(100));
    let start = params.start.expect("start");
    let end = params.end.expect("end");
    assert_eq!((end - start).num_milliseconds(), 86_400_500);
}

#[test]
fn export_format_defaults_to_json() {
    let params: HistoryExportParams = serde_json::from_str("{}").expect("parse");
    assert_eq!(params.format, ExportFormat::Json);
    let params: HistoryExportParams = serde_json::from_str(r#"{"format":"csv"}"#).expect("parse");
    assert_eq!(params.format, ExportFormat::Csv);
}

#[test]
fn poll_now_is_camel_case() {
    let value = serde_json::to_value(PollNowDto {
        device_id: "d1".to_string(),
        outcome: PollOutcomeDto::Skipped,
    })
    .expect("serialize");
    assert_eq!(value["deviceId"], "d1");
    assert_eq!(value["outcome"], "skipped");
    assert!(value.get("device_id").is_none());
}

#[test]
fn error_envelope_has_no_data() {
    let value = serde_json::to_value(ApiResponse::<()>::error(
        "RESOURCE.NOT_FOUND",
        "logger not found: h9",
    ))
    .expect("serialize");
    assert_eq!(value["success"], false);
    assert!(value["data"].is_null());
    assert_eq!(value["error"]["code"], "RESOURCE.NOT_FOUND");
    assert_eq!(value["error"]["message"], "logger not found: h9");
}
