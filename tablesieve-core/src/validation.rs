//! JSON Schema validation for quality report output.
//!
//! Every report is checked against an embedded JSON Schema before it is
//! written, so downstream consumers can rely on the document layout.
//! Beyond the schema, the counts must be consistent with each other.
//!
//! # Example
//! ```rust
//! use tablesieve_core::validation::validate_report_output;
//! use serde_json::json;
//!
//! let report = json!({
//!     "timestamp": "2024-01-01T00:00:00Z",
//!     "total_records": 100,
//!     "cleaned_records": 95,
//!     "quarantined_records": 5,
//!     "pass_rate_pct": 95.0
//! });
//! validate_report_output(&report).unwrap();
//! ```

use jsonschema::Validator;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

use crate::report::QualityReport;

/// JSON Schema validation errors with detailed field-level reporting
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema compilation failed during initialization
    #[error("JSON Schema compilation failed: {message}")]
    SchemaCompilation { message: String },

    /// Validation failed with specific field errors
    #[error("Schema validation failed with {error_count} errors: {errors:?}")]
    ValidationFailed {
        error_count: usize,
        errors: Vec<String>,
    },

    /// Counts contradict each other
    #[error("Inconsistent report counts: {reason}")]
    InconsistentCounts { reason: String },

    /// JSON parsing error
    #[error("JSON parsing failed: {source}")]
    JsonParsing {
        #[from]
        source: serde_json::Error,
    },
}

/// Embedded JSON Schema for quality reports
const REPORT_SCHEMA: &str = r#"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "tablesieve Quality Report",
  "type": "object",
  "required": [
    "timestamp",
    "total_records",
    "cleaned_records",
    "quarantined_records",
    "pass_rate_pct"
  ],
  "additionalProperties": false,
  "properties": {
    "timestamp": {
      "type": "string",
      "pattern": "^\\d{4}-\\d{2}-\\d{2}T\\d{2}:\\d{2}:\\d{2}(\\.\\d+)?(Z|[+-]\\d{2}:\\d{2})$"
    },
    "total_records": { "type": "integer", "minimum": 0 },
    "cleaned_records": { "type": "integer", "minimum": 0 },
    "quarantined_records": { "type": "integer", "minimum": 0 },
    "pass_rate_pct": { "type": "number", "minimum": 0, "maximum": 100 }
  }
}"#;

static COMPILED_SCHEMA: OnceLock<Validator> = OnceLock::new();

/// Compiles the embedded report schema.
///
/// Calling this more than once is harmless; validation initializes the
/// schema on first use when it was not called.
pub fn initialize_report_validator() -> Result<(), ValidationError> {
    if COMPILED_SCHEMA.get().is_some() {
        return Ok(());
    }

    let schema_json: Value =
        serde_json::from_str(REPORT_SCHEMA).map_err(|e| ValidationError::SchemaCompilation {
            message: format!("Failed to parse embedded schema: {}", e),
        })?;

    let compiled = jsonschema::validator_for(&schema_json).map_err(|e| {
        ValidationError::SchemaCompilation {
            message: format!("Schema compilation error: {}", e),
        }
    })?;

    // Another thread may have won the race, which is fine
    let _ = COMPILED_SCHEMA.set(compiled);

    Ok(())
}

fn compiled_schema() -> Result<&'static Validator, ValidationError> {
    initialize_report_validator()?;
    COMPILED_SCHEMA
        .get()
        .ok_or_else(|| ValidationError::SchemaCompilation {
            message: "Report validator not initialized".to_string(),
        })
}

/// Validates a report document against the schema and count invariants.
pub fn validate_report_output(json_value: &Value) -> Result<(), ValidationError> {
    let schema = compiled_schema()?;

    let errors: Vec<String> = schema
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ValidationError::ValidationFailed {
            error_count: errors.len(),
            errors,
        });
    }

    validate_count_consistency(json_value)
}

fn validate_count_consistency(json_value: &Value) -> Result<(), ValidationError> {
    let count = |field: &str| json_value.get(field).and_then(Value::as_u64).unwrap_or(0);
    let total = count("total_records");
    let cleaned = count("cleaned_records");
    let quarantined = count("quarantined_records");

    if cleaned > total {
        return Err(ValidationError::InconsistentCounts {
            reason: format!("cleaned_records {} exceeds total_records {}", cleaned, total),
        });
    }
    if quarantined > total {
        return Err(ValidationError::InconsistentCounts {
            reason: format!(
                "quarantined_records {} exceeds total_records {}",
                quarantined, total
            ),
        });
    }
    Ok(())
}

/// Validates and parses a report from JSON text.
pub fn validate_and_parse_report(json_str: &str) -> Result<QualityReport, ValidationError> {
    let json_value: Value = serde_json::from_str(json_str)?;

    validate_report_output(&json_value)?;

    let report: QualityReport = serde_json::from_value(json_value)?;
    Ok(report)
}

/// Get the embedded JSON Schema as a parsed Value for external use
pub fn get_report_schema() -> Result<Value, ValidationError> {
    serde_json::from_str(REPORT_SCHEMA).map_err(|e| ValidationError::SchemaCompilation {
        message: format!("Failed to parse embedded schema: {}", e),
    })
}

#[cfg(test)]
mod tests;
