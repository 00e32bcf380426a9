//! Pipeline configuration.
//!
//! This module provides configuration for a pipeline run: where artifacts
//! land, which rule document to load, and how the anomaly detector behaves.
//! Directories are only created by [`ArtifactDirs::initialize`], which the
//! pipeline calls once during setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::ReasonPolicy;
use crate::schema::DEFAULT_CATEGORICAL_THRESHOLD;
use crate::{PipelineError, Result};

/// Default location of the rule document.
pub const DEFAULT_RULES_PATH: &str = "config/default_rules.yml";

/// Default root of the artifact directories.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Expected fraction of outliers used when none is configured.
pub const DEFAULT_CONTAMINATION: f64 = 0.05;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 42;

/// Number of isolation trees used when none is configured.
pub const DEFAULT_ESTIMATORS: usize = 100;

/// Upper bound on the per-tree subsample size.
pub const DEFAULT_MAX_SAMPLES: usize = 256;

const MIN_CONTAMINATION: f64 = 0.001;
const MAX_CONTAMINATION: f64 = 0.5;

/// Validation errors for pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("contamination must be in (0.0, 0.5], got {0}")]
    InvalidContamination(f64),
    #[error("n_estimators must be at least 1")]
    NoEstimators,
    #[error("max_samples must be at least 1")]
    NoSamples,
    #[error("categorical_threshold must be at least 1")]
    InvalidCategoricalThreshold,
    #[error("{0} directory path is empty")]
    EmptyDirectory(&'static str),
}

impl From<ConfigValidationError> for PipelineError {
    fn from(error: ConfigValidationError) -> Self {
        PipelineError::configuration(error.to_string())
    }
}

/// Anomaly detection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Enable anomaly detection
    pub enabled: bool,
    /// Expected fraction of outliers, in (0.0, 0.5]
    pub contamination: f64,
    /// Random seed for the isolation forest
    pub seed: u64,
    /// Number of isolation trees
    pub n_estimators: usize,
    /// Upper bound on rows drawn per tree
    pub max_samples: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            contamination: DEFAULT_CONTAMINATION,
            seed: DEFAULT_SEED,
            n_estimators: DEFAULT_ESTIMATORS,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

impl AnomalyConfig {
    /// Creates a new anomaly config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to enable/disable anomaly detection.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder method to set the contamination ratio.
    pub fn with_contamination(mut self, contamination: f64) -> Self {
        if !(contamination > 0.0 && contamination <= MAX_CONTAMINATION) {
            tracing::warn!(
                "contamination {} clamped to valid range [{}, {}]",
                contamination,
                MIN_CONTAMINATION,
                MAX_CONTAMINATION
            );
        }
        self.contamination = if contamination.is_nan() {
            DEFAULT_CONTAMINATION
        } else {
            contamination.clamp(MIN_CONTAMINATION, MAX_CONTAMINATION)
        };
        self
    }

    /// Builder method to set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builder method to set the number of trees.
    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        if n_estimators == 0 {
            tracing::warn!("n_estimators 0 raised to 1");
        }
        self.n_estimators = n_estimators.max(1);
        self
    }

    /// Builder method to set the per-tree subsample bound.
    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        if max_samples == 0 {
            tracing::warn!("max_samples 0 raised to 1");
        }
        self.max_samples = max_samples.max(1);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if !(self.contamination > 0.0 && self.contamination <= MAX_CONTAMINATION) {
            return Err(ConfigValidationError::InvalidContamination(
                self.contamination,
            ));
        }
        if self.n_estimators == 0 {
            return Err(ConfigValidationError::NoEstimators);
        }
        if self.max_samples == 0 {
            return Err(ConfigValidationError::NoSamples);
        }
        Ok(())
    }
}

/// Target directories for pipeline artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDirs {
    /// Clean output tables
    pub clean: PathBuf,
    /// Quarantined rows
    pub quarantine: PathBuf,
    /// Quality reports
    pub reports: PathBuf,
    /// Generated sample data
    pub samples: PathBuf,
}

impl Default for ArtifactDirs {
    fn default() -> Self {
        Self::under(DEFAULT_DATA_DIR)
    }
}

impl ArtifactDirs {
    /// Lays out the standard subdirectories below a root directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            clean: root.join("clean"),
            quarantine: root.join("quarantine"),
            reports: root.join("reports"),
            samples: root.join("samples"),
        }
    }

    /// Creates the directories a pipeline run writes to.
    ///
    /// # Errors
    /// Returns an I/O error naming the directory that could not be created.
    pub fn initialize(&self) -> Result<()> {
        for dir in [&self.clean, &self.quarantine, &self.reports] {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::io("create", dir, e))?;
        }
        tracing::debug!(
            "Artifact directories ready: clean={}, quarantine={}, reports={}",
            self.clean.display(),
            self.quarantine.display(),
            self.reports.display()
        );
        Ok(())
    }

    fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        let named = [
            ("clean", &self.clean),
            ("quarantine", &self.quarantine),
            ("reports", &self.reports),
            ("samples", &self.samples),
        ];
        match named.iter().find(|(_, path)| path.as_os_str().is_empty()) {
            Some((name, _)) => Err(ConfigValidationError::EmptyDirectory(name)),
            None => Ok(()),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Artifact directories
    pub dirs: ArtifactDirs,
    /// Rule document location
    pub rules_path: PathBuf,
    /// Anomaly detection settings
    pub anomaly: AnomalyConfig,
    /// Overrides the reason policy of the rule document when set
    pub reason_policy: Option<ReasonPolicy>,
    /// Distinct-value bound for categorical columns
    pub categorical_threshold: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dirs: ArtifactDirs::default(),
            rules_path: PathBuf::from(DEFAULT_RULES_PATH),
            anomaly: AnomalyConfig::default(),
            reason_policy: None,
            categorical_threshold: DEFAULT_CATEGORICAL_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    /// Creates a new pipeline config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to place every artifact directory below `root`.
    pub fn with_data_dir(mut self, root: impl AsRef<Path>) -> Self {
        self.dirs = ArtifactDirs::under(root);
        self
    }

    /// Builder method to set the artifact directories.
    pub fn with_dirs(mut self, dirs: ArtifactDirs) -> Self {
        self.dirs = dirs;
        self
    }

    /// Builder method to set the rule document location.
    pub fn with_rules_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rules_path = path.into();
        self
    }

    /// Builder method to set anomaly detection config.
    pub fn with_anomaly(mut self, config: AnomalyConfig) -> Self {
        self.anomaly = config;
        self
    }

    /// Builder method to override the rule document's reason policy.
    pub fn with_reason_policy(mut self, policy: ReasonPolicy) -> Self {
        self.reason_policy = Some(policy);
        self
    }

    /// Builder method to set the categorical threshold.
    pub fn with_categorical_threshold(mut self, threshold: usize) -> Self {
        if threshold == 0 {
            tracing::warn!("categorical_threshold 0 raised to 1");
        }
        self.categorical_threshold = threshold.max(1);
        self
    }

    /// Validates the configuration.
    ///
    /// Returns an error if any field is outside its valid range.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        self.anomaly.validate()?;
        if self.categorical_threshold == 0 {
            return Err(ConfigValidationError::InvalidCategoricalThreshold);
        }
        self.dirs.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.rules_path, PathBuf::from("config/default_rules.yml"));
        assert_eq!(config.dirs.clean, PathBuf::from("data/clean"));
        assert_eq!(config.dirs.quarantine, PathBuf::from("data/quarantine"));
        assert_eq!(config.categorical_threshold, 20);
        assert!(config.anomaly.enabled);
        assert_eq!(config.anomaly.contamination, 0.05);
        assert_eq!(config.anomaly.seed, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_contamination_clamping() {
        assert_eq!(
            AnomalyConfig::new().with_contamination(0.9).contamination,
            0.5
        );
        assert_eq!(
            AnomalyConfig::new().with_contamination(-1.0).contamination,
            0.001
        );
        assert_eq!(
            AnomalyConfig::new().with_contamination(f64::NAN).contamination,
            DEFAULT_CONTAMINATION
        );
        assert_eq!(
            AnomalyConfig::new().with_contamination(0.1).contamination,
            0.1
        );
    }

    #[test]
    fn test_validation_catches_direct_field_assignment() {
        let mut config = PipelineConfig::default();
        config.anomaly.contamination = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidContamination(_))
        ));

        let mut config = PipelineConfig::default();
        config.anomaly.n_estimators = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::NoEstimators)
        ));

        let mut config = PipelineConfig::default();
        config.categorical_threshold = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidCategoricalThreshold)
        ));

        let mut config = PipelineConfig::default();
        config.dirs.reports = PathBuf::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::EmptyDirectory("reports"))
        ));
    }

    #[test]
    fn test_builder_floors() {
        let anomaly = AnomalyConfig::new().with_n_estimators(0).with_max_samples(0);
        assert_eq!(anomaly.n_estimators, 1);
        assert_eq!(anomaly.max_samples, 1);
        assert_eq!(
            PipelineConfig::new()
                .with_categorical_threshold(0)
                .categorical_threshold,
            1
        );
    }

    #[test]
    fn test_initialize_creates_directories() {
        let temp = tempfile::tempdir().unwrap();
        let dirs = ArtifactDirs::under(temp.path().join("data"));
        assert!(!dirs.clean.exists());

        dirs.initialize().unwrap();
        assert!(dirs.clean.is_dir());
        assert!(dirs.quarantine.is_dir());
        assert!(dirs.reports.is_dir());
        // Initialization is repeatable
        dirs.initialize().unwrap();
    }

    #[test]
    fn test_config_serialization() {
        let config = PipelineConfig::new()
            .with_data_dir("/srv/quality")
            .with_reason_policy(ReasonPolicy::All);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
        assert!(json.contains("\"reason_policy\":\"all\""));
    }

    #[test]
    fn test_validation_error_converts_to_configuration() {
        let error: PipelineError = ConfigValidationError::NoSamples.into();
        assert!(matches!(error, PipelineError::Configuration { .. }));
    }
}
