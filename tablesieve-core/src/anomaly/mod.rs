//! Multivariate anomaly detection over the numeric columns of a table.
//!
//! Rows that passed rule validation are scored with an isolation forest.
//! The lowest-scoring `contamination` fraction is split off and annotated
//! with [`ANOMALY_REASON`].

mod isolation_forest;

use crate::Result;
use crate::config::AnomalyConfig;
use crate::models::{FAILURE_REASON_COLUMN, RecordTable, StorageType};

use isolation_forest::{IsolationForest, percentile};

/// Failure reason attached to every anomalous row.
pub const ANOMALY_REASON: &str = "ML anomaly detected";

/// Result of anomaly detection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnomalyOutcome {
    /// Rows not flagged, in input order
    pub accepted: RecordTable,
    /// Flagged rows with a trailing `failure_reason` column, in input order
    pub anomalous: RecordTable,
    /// Columns used as features; empty when detection was skipped
    pub features: Vec<String>,
    /// Normal-ness score per input row (lower is more anomalous); empty when
    /// detection was skipped
    pub scores: Vec<f64>,
}

impl AnomalyOutcome {
    fn passthrough(table: &RecordTable) -> Self {
        let mut annotated = table.columns.clone();
        annotated.push(FAILURE_REASON_COLUMN.to_string());
        Self {
            accepted: table.clone(),
            anomalous: RecordTable::new(annotated),
            features: Vec::new(),
            scores: Vec::new(),
        }
    }
}

/// Isolation-forest anomaly detector.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    /// Creates a detector with the given configuration.
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    /// Creates a detector with default configuration.
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// Splits a table into accepted and anomalous rows.
    ///
    /// Detection is skipped (everything accepted) when it is disabled, the
    /// table has fewer than two rows, or no column holds a finite number.
    /// Missing feature values are replaced by the column mean for scoring
    /// only; returned rows keep their original values.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid config and
    /// `MalformedTable` for a table with an inconsistent shape.
    pub fn detect(&self, table: &RecordTable) -> Result<AnomalyOutcome> {
        self.config.validate()?;
        table.check_shape()?;

        if !self.config.enabled {
            tracing::debug!("Anomaly detection disabled, accepting all rows");
            return Ok(AnomalyOutcome::passthrough(table));
        }
        if table.len() < 2 {
            tracing::debug!("Anomaly detection skipped: {} row(s)", table.len());
            return Ok(AnomalyOutcome::passthrough(table));
        }

        let feature_columns = numeric_features(table);
        if feature_columns.is_empty() {
            tracing::debug!("Anomaly detection skipped: no numeric columns");
            return Ok(AnomalyOutcome::passthrough(table));
        }

        let matrix = imputed_matrix(table, &feature_columns);
        let forest = IsolationForest::fit(
            &matrix,
            self.config.n_estimators,
            self.config.max_samples,
            self.config.seed,
        );
        let scores = forest.score_samples(&matrix);

        let Some(threshold) = percentile(&scores, self.config.contamination * 100.0) else {
            return Ok(AnomalyOutcome::passthrough(table));
        };

        let (anomalous_rows, accepted_rows): (Vec<usize>, Vec<usize>) =
            (0..table.len()).partition(|&i| scores[i] < threshold);

        let features: Vec<String> = feature_columns
            .iter()
            .map(|&idx| table.columns[idx].clone())
            .collect();

        tracing::info!(
            "Anomaly detection flagged {} of {} row(s) using {} feature(s)",
            anomalous_rows.len(),
            table.len(),
            features.len()
        );

        let reasons = vec![ANOMALY_REASON.to_string(); anomalous_rows.len()];
        Ok(AnomalyOutcome {
            accepted: table.select_rows(&accepted_rows),
            anomalous: table.select_annotated(&anomalous_rows, &reasons),
            features,
            scores,
        })
    }
}

/// Indices of numeric columns with at least one finite value.
fn numeric_features(table: &RecordTable) -> Vec<usize> {
    (0..table.width())
        .filter(|&idx| table.storage_type(idx) == StorageType::Numeric)
        .filter(|&idx| table.column_values(idx).any(|v| v.as_finite_f64().is_some()))
        .collect()
}

/// Row-major feature matrix with missing and non-finite values replaced by
/// the column mean.
fn imputed_matrix(table: &RecordTable, feature_columns: &[usize]) -> Vec<Vec<f64>> {
    let means: Vec<f64> = feature_columns
        .iter()
        .map(|&idx| {
            let (sum, count) = table
                .column_values(idx)
                .filter_map(|v| v.as_finite_f64())
                .fold((0.0, 0usize), |(sum, count), v| (sum + v, count.saturating_add(1)));
            if count == 0 { 0.0 } else { sum / count as f64 }
        })
        .collect();

    table
        .rows
        .iter()
        .map(|row| {
            feature_columns
                .iter()
                .zip(&means)
                .map(|(&idx, &mean)| {
                    row.get(idx)
                        .and_then(|v| v.as_finite_f64())
                        .unwrap_or(mean)
                })
                .collect()
        })
        .collect()
}

/// Detects anomalies with the default configuration.
pub fn detect_anomalies(table: &RecordTable) -> Result<AnomalyOutcome> {
    AnomalyDetector::with_defaults().detect(table)
}
