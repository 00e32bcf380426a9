//! Core data quality pipeline for tablesieve.
//!
//! This crate turns one delimited file into a set of reviewable artifacts:
//! rows that pass every check go to a clean output, rows that fail a rule or
//! look statistically anomalous go to a quarantine file annotated with the
//! reason, and a JSON quality report records the counts.
//!
//! # Pipeline Guarantees
//! - Every input row ends up in exactly one of the clean output or the
//!   quarantine (anomaly-only rows are never duplicated)
//! - Artifacts are timestamp-qualified and never overwrite each other
//! - Reports are checked against an embedded JSON Schema before writing
//! - Only input, configuration and artifact-write failures abort a run
//!
//! # Example
//! ```rust,no_run
//! use tablesieve_core::{Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::new()
//!     .with_data_dir("data")
//!     .with_rules_path("config/default_rules.yml");
//! let outcome = Pipeline::new(config)?.run("customers.csv")?;
//! println!("pass rate: {}%", outcome.summary.report.pass_rate_pct);
//! # Ok::<(), tablesieve_core::PipelineError>(())
//! ```

pub mod anomaly;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod quarantine;
pub mod report;
pub mod rules;
pub mod samples;
pub mod schema;
#[cfg(feature = "sink")]
pub mod sink;
pub mod validation;

// Re-export commonly used types
pub use anomaly::{AnomalyDetector, AnomalyOutcome, detect_anomalies};
pub use config::{AnomalyConfig, ArtifactDirs, ConfigValidationError, PipelineConfig};
pub use error::{PipelineError, Result};
pub use logging::{LogFormat, init_logging};
pub use models::{FAILURE_REASON_COLUMN, RecordTable, StorageType, Value};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineSummary, run_pipeline};
pub use quarantine::{QuarantineInput, merge_quarantine, quarantine_rows};
pub use report::{QualityReport, generate_report};
pub use rules::{Constraint, ReasonPolicy, RuleSet, RuleValidator, ValidationOutcome, apply_rules};
pub use schema::{ColumnSchema, SchemaInferencer, SemanticType, infer_schema};

#[cfg(feature = "sink")]
pub use sink::{SinkStatus, SqlSink, TableSink, persist_clean_table};

pub use validation::{
    ValidationError, initialize_report_validator, validate_and_parse_report,
    validate_report_output,
};
