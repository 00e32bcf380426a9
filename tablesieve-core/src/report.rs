//! Quality report generation.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifacts::{RunStamp, write_artifact};
use crate::validation::validate_report_output;
use crate::{PipelineError, Result};

/// Label of report artifacts.
pub const REPORT_LABEL: &str = "report";

/// Summary statistics for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// When the report was created (UTC)
    pub timestamp: DateTime<Utc>,
    /// Rows in the input table
    pub total_records: u64,
    /// Rows written to the clean output
    pub cleaned_records: u64,
    /// Rows written to the quarantine output
    pub quarantined_records: u64,
    /// `cleaned / total × 100`, rounded to two decimals; 0.0 for empty input
    pub pass_rate_pct: f64,
}

impl QualityReport {
    /// Builds a report stamped with the current UTC time.
    pub fn new(total: u64, cleaned: u64, quarantined: u64) -> Self {
        Self::at(Utc::now(), total, cleaned, quarantined)
    }

    /// Builds a report with an explicit timestamp.
    pub fn at(timestamp: DateTime<Utc>, total: u64, cleaned: u64, quarantined: u64) -> Self {
        Self {
            timestamp,
            total_records: total,
            cleaned_records: cleaned,
            quarantined_records: quarantined,
            pass_rate_pct: pass_rate(total, cleaned),
        }
    }
}

/// Percentage of rows reaching the clean output, rounded to two decimals.
///
/// Always within [0, 100]; an empty input has a pass rate of 0.0.
pub fn pass_rate(total: u64, cleaned: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let ratio = cleaned.min(total) as f64 / total as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

/// Writes a validated report as pretty JSON to `report_<ts>.json`.
pub fn write_report(report: &QualityReport, dir: &Path, stamp: &RunStamp) -> Result<PathBuf> {
    let document = serde_json::to_value(report).map_err(|e| PipelineError::Serialization {
        context: "Failed to serialize quality report".to_string(),
        source: e,
    })?;
    validate_report_output(&document)?;

    let path = write_artifact(dir, REPORT_LABEL, "json", stamp, |w| {
        serde_json::to_writer_pretty(&mut *w, &document).map_err(|e| {
            PipelineError::Serialization {
                context: "Failed to write quality report".to_string(),
                source: e,
            }
        })?;
        w.write_all(b"\n").map_err(|e| PipelineError::Io {
            context: "Failed to write quality report".to_string(),
            source: e,
        })
    })?;

    tracing::info!("Quality report saved: {}", path.display());
    Ok(path)
}

/// Builds, validates and writes a report for the given counts.
///
/// `dir` must already exist.
pub fn generate_report(
    total: u64,
    cleaned: u64,
    quarantined: u64,
    dir: &Path,
) -> Result<(QualityReport, PathBuf)> {
    let stamp = RunStamp::now();
    let report = QualityReport::at(stamp.datetime(), total, cleaned, quarantined);
    let path = write_report(&report, dir, &stamp)?;
    Ok((report, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_and_parse_report;

    #[test]
    fn test_pass_rate() {
        assert_eq!(pass_rate(100, 95), 95.0);
        assert_eq!(pass_rate(3, 2), 66.67);
        assert_eq!(pass_rate(3, 1), 33.33);
        assert_eq!(pass_rate(50, 50), 100.0);
        assert_eq!(pass_rate(0, 0), 0.0);
        assert_eq!(pass_rate(7, 0), 0.0);
    }

    #[test]
    fn test_report_fields() {
        let report = QualityReport::new(100, 95, 5);
        assert_eq!(report.total_records, 100);
        assert_eq!(report.cleaned_records, 95);
        assert_eq!(report.quarantined_records, 5);
        assert_eq!(report.pass_rate_pct, 95.0);
        assert!(report.timestamp <= Utc::now());
    }

    #[test]
    fn test_generate_report_writes_valid_json() {
        let temp = tempfile::tempdir().unwrap();
        let (report, path) = generate_report(50, 47, 3, temp.path()).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("report_"));
        assert!(name.ends_with(".json"));

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed = validate_and_parse_report(&text).unwrap();
        assert_eq!(parsed, report);
        assert_eq!(parsed.pass_rate_pct, 94.0);
    }

    #[test]
    fn test_empty_input_report() {
        let temp = tempfile::tempdir().unwrap();
        let (report, _) = generate_report(0, 0, 0, temp.path()).unwrap();
        assert_eq!(report.pass_rate_pct, 0.0);
    }

    #[test]
    fn test_inconsistent_counts_rejected_before_write() {
        let temp = tempfile::tempdir().unwrap();
        let result = generate_report(10, 12, 0, temp.path());
        assert!(matches!(result, Err(PipelineError::ReportValidation(_))));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
