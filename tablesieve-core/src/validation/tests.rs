//! Tests for quality report schema validation.

use super::*;
use serde_json::json;

fn valid_report() -> Value {
    json!({
        "timestamp": "2024-05-01T12:30:00.123456Z",
        "total_records": 50,
        "cleaned_records": 47,
        "quarantined_records": 3,
        "pass_rate_pct": 94.0
    })
}

#[test]
fn test_initialization_is_repeatable() {
    assert!(initialize_report_validator().is_ok());
    assert!(initialize_report_validator().is_ok());
}

#[test]
fn test_valid_report_passes() {
    assert!(validate_report_output(&valid_report()).is_ok());
}

#[test]
fn test_offset_timestamp_passes() {
    let mut report = valid_report();
    report["timestamp"] = json!("2024-05-01T12:30:00+00:00");
    assert!(validate_report_output(&report).is_ok());
}

#[test]
fn test_missing_field_fails() {
    let mut report = valid_report();
    report.as_object_mut().unwrap().remove("pass_rate_pct");

    match validate_report_output(&report) {
        Err(ValidationError::ValidationFailed { error_count, .. }) => {
            assert_eq!(error_count, 1);
        }
        other => panic!("expected ValidationFailed, got {:?}", other),
    }
}

#[test]
fn test_pass_rate_out_of_range_fails() {
    let mut report = valid_report();
    report["pass_rate_pct"] = json!(120.5);
    assert!(matches!(
        validate_report_output(&report),
        Err(ValidationError::ValidationFailed { .. })
    ));
}

#[test]
fn test_negative_and_fractional_counts_fail() {
    let mut report = valid_report();
    report["total_records"] = json!(-1);
    report["cleaned_records"] = json!(1.5);

    match validate_report_output(&report) {
        Err(ValidationError::ValidationFailed { error_count, errors }) => {
            assert_eq!(error_count, 2);
            assert_eq!(errors.len(), 2);
        }
        other => panic!("expected ValidationFailed, got {:?}", other),
    }
}

#[test]
fn test_unknown_field_fails() {
    let mut report = valid_report();
    report["database_url"] = json!("mysql://user:pw@host/db");
    assert!(validate_report_output(&report).is_err());
}

#[test]
fn test_bad_timestamp_fails() {
    let mut report = valid_report();
    report["timestamp"] = json!("yesterday");
    assert!(validate_report_output(&report).is_err());
}

#[test]
fn test_inconsistent_counts_fail() {
    let mut report = valid_report();
    report["cleaned_records"] = json!(60);
    assert!(matches!(
        validate_report_output(&report),
        Err(ValidationError::InconsistentCounts { .. })
    ));
}

#[test]
fn test_validate_and_parse_report() {
    let text = serde_json::to_string(&valid_report()).unwrap();
    let report = validate_and_parse_report(&text).unwrap();
    assert_eq!(report.total_records, 50);
    assert_eq!(report.pass_rate_pct, 94.0);

    assert!(matches!(
        validate_and_parse_report("{not json"),
        Err(ValidationError::JsonParsing { .. })
    ));
}

#[test]
fn test_schema_definition_is_exposed() {
    let schema = get_report_schema().unwrap();
    assert_eq!(schema["additionalProperties"], json!(false));
    assert_eq!(schema["required"].as_array().unwrap().len(), 5);
}
