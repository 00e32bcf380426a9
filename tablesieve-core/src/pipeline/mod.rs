//! Pipeline orchestration.
//!
//! A [`Pipeline`] is built once from a [`PipelineConfig`]: the config is
//! validated, the rule document loaded and compiled, and the artifact
//! directories created. Each [`Pipeline::run`] then processes one CSV file:
//!
//! 1. load the file with encoding fallbacks
//! 2. infer the column schema (failures are logged, not fatal)
//! 3. validate rows against the rules
//! 4. score the valid rows for anomalies
//! 5. merge invalid and anomalous rows into the quarantine
//! 6. write the accepted rows and the quality report

mod loader;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::anomaly::AnomalyDetector;
use crate::artifacts::{RunStamp, write_artifact};
use crate::config::PipelineConfig;
use crate::models::RecordTable;
use crate::quarantine::{QuarantineInput, merge_quarantine, write_quarantine};
use crate::report::{QualityReport, write_report};
use crate::rules::{RuleSet, RuleValidator};
use crate::schema::{ColumnSchema, SchemaInferencer};
use crate::{PipelineError, Result};

pub use loader::{LoadedTable, decode_table, load_table, parse_csv_text};

/// Label of clean output artifacts.
pub const CLEAN_LABEL: &str = "clean_output";

/// Structured result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Absolute path of the processed file
    pub input_path: PathBuf,
    /// Encoding the input was decoded with
    pub encoding: String,
    /// Clean output artifact
    pub clean_path: PathBuf,
    /// Quarantine artifact; absent when nothing was quarantined
    pub quarantine_path: Option<PathBuf>,
    /// Quality report artifact
    pub report_path: PathBuf,
    /// Rows in the input
    pub total_rows: usize,
    /// Rows passing rule validation
    pub valid_rows: usize,
    /// Rows failing rule validation
    pub invalid_rows: usize,
    /// Valid rows flagged as anomalous
    pub anomaly_rows: usize,
    /// Rows written to the clean output
    pub clean_rows: usize,
    /// Rows written to the quarantine after deduplication
    pub quarantined_rows: usize,
    /// Inferred schema; absent when inference failed
    pub schema: Option<ColumnSchema>,
    /// The quality report that was written
    pub report: QualityReport,
}

/// Summary plus the clean table, for callers that persist it elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// Run summary
    pub summary: PipelineSummary,
    /// Accepted rows
    pub clean: RecordTable,
}

/// A configured data quality pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    rules: RuleSet,
    validator: RuleValidator,
    inferencer: SchemaInferencer,
    detector: AnomalyDetector,
}

impl Pipeline {
    /// Builds a pipeline, loading rules from `config.rules_path`.
    ///
    /// # Errors
    /// Returns a configuration error when the config is invalid or the rule
    /// document is missing or malformed, and an I/O error when the artifact
    /// directories cannot be created.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let rules = RuleSet::load(&config.rules_path)?;
        Self::with_rules(config, rules)
    }

    /// Builds a pipeline with an in-memory rule set.
    pub fn with_rules(config: PipelineConfig, mut rules: RuleSet) -> Result<Self> {
        config.validate()?;
        if let Some(policy) = config.reason_policy {
            rules.reason_policy = policy;
        }
        let validator = RuleValidator::new(&rules)?;
        config.dirs.initialize()?;

        let inferencer =
            SchemaInferencer::new().with_categorical_threshold(config.categorical_threshold);
        let detector = AnomalyDetector::new(config.anomaly.clone());

        tracing::debug!(
            "Pipeline ready: {} rule column(s), anomaly detection {}",
            rules.columns.len(),
            if config.anomaly.enabled {
                "enabled"
            } else {
                "disabled"
            }
        );

        Ok(Self {
            config,
            rules,
            validator,
            inferencer,
            detector,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the effective rule set.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Processes one CSV file.
    ///
    /// # Errors
    /// Returns an input error when the file is missing or not tabular, and
    /// I/O or report validation errors when an artifact cannot be written.
    pub fn run(&self, path: impl AsRef<Path>) -> Result<PipelineOutcome> {
        let path = path.as_ref();
        let input_path = std::path::absolute(path).map_err(|e| {
            PipelineError::input_with(format!("Invalid input path {}", path.display()), e)
        })?;
        if !input_path.exists() {
            return Err(PipelineError::input(format!(
                "Input file not found: {}",
                input_path.display()
            )));
        }

        tracing::info!("Processing {}", input_path.display());
        let loaded = load_table(&input_path)?;
        self.process(input_path, loaded)
    }

    /// Processes an already loaded table.
    pub fn process(&self, input_path: PathBuf, loaded: LoadedTable) -> Result<PipelineOutcome> {
        let LoadedTable { table, encoding } = loaded;
        let stamp = RunStamp::now();

        let schema = match self.inferencer.infer(&table) {
            Ok(schema) => Some(schema),
            Err(e) => {
                tracing::warn!("Schema inference unavailable: {}", e);
                None
            }
        };

        let validation = self.validator.validate(&table);
        tracing::info!(
            "Rule validation: {} valid, {} invalid",
            validation.valid.len(),
            validation.invalid.len()
        );

        let anomalies = self.detector.detect(&validation.valid)?;

        let valid_rows = validation.valid.len();
        let invalid_rows = validation.invalid.len();
        let anomaly_rows = anomalies.anomalous.len();

        let quarantine = merge_quarantine(
            Some(QuarantineInput::Table(validation.invalid)),
            Some(QuarantineInput::Table(anomalies.anomalous)),
        );
        let quarantine_path = quarantine
            .as_ref()
            .map(|q| write_quarantine(q, &self.config.dirs.quarantine, &stamp))
            .transpose()?;
        let quarantined_rows = quarantine.as_ref().map_or(0, RecordTable::len);

        let clean = anomalies.accepted;
        let clean_path =
            write_artifact(&self.config.dirs.clean, CLEAN_LABEL, "csv", &stamp, |w| {
                clean.write_csv(w)
            })?;
        tracing::info!("Clean output saved: {}", clean_path.display());

        let report = QualityReport::at(
            stamp.datetime(),
            table.len() as u64,
            clean.len() as u64,
            quarantined_rows as u64,
        );
        let report_path = write_report(&report, &self.config.dirs.reports, &stamp)?;

        let summary = PipelineSummary {
            input_path,
            encoding,
            clean_path,
            quarantine_path,
            report_path,
            total_rows: table.len(),
            valid_rows,
            invalid_rows,
            anomaly_rows,
            clean_rows: clean.len(),
            quarantined_rows,
            schema,
            report,
        };

        tracing::info!(
            "Run complete: {} of {} row(s) clean ({}%)",
            summary.clean_rows,
            summary.total_rows,
            summary.report.pass_rate_pct
        );

        Ok(PipelineOutcome { summary, clean })
    }
}

/// Builds a pipeline from `config` and processes one file.
pub fn run_pipeline(path: impl AsRef<Path>, config: PipelineConfig) -> Result<PipelineOutcome> {
    Pipeline::new(config)?.run(path)
}
