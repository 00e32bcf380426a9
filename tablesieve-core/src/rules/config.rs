//! Rule document model and loading.
//!
//! Rules are a YAML document mapping column names to lists of constraints:
//!
//! ```yaml
//! reason_policy: first
//! defaults: []
//! columns:
//!   customer_id:
//!     - kind: not_null
//!     - kind: pattern
//!       regex: "^C\\d{5}$"
//!   age:
//!     - kind: range
//!       min: 0
//!       max: 120
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{PipelineError, Result};

/// A single correctness constraint on the values of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// Value must not be null
    NotNull,
    /// Value must be a number within the inclusive bounds
    Range {
        /// Lower bound (inclusive)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        /// Upper bound (inclusive)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// Rendered value must fully match the regular expression
    Pattern {
        /// Regular expression source
        regex: String,
    },
    /// Rendered value must be one of the listed values
    AllowedSet {
        /// Accepted values
        values: Vec<String>,
    },
    /// Rendered value must not exceed the character count
    MaxLength {
        /// Maximum number of characters
        max: usize,
    },
}

/// How failure reasons are recorded when a row violates several constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasonPolicy {
    /// Keep only the first failure found (column order, then constraint order)
    #[default]
    First,
    /// Keep every failure, joined with `"; "`
    All,
}

/// A complete rule configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Reason recording policy
    #[serde(default)]
    pub reason_policy: ReasonPolicy,
    /// Constraints applied to every column, before its own constraints
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaults: Vec<Constraint>,
    /// Per-column constraints
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<Constraint>>,
}

impl RuleSet {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add constraints for a column.
    pub fn with_column(mut self, column: impl Into<String>, constraints: Vec<Constraint>) -> Self {
        self.columns.entry(column.into()).or_default().extend(constraints);
        self
    }

    /// Builder method to set constraints applied to every column.
    pub fn with_defaults(mut self, constraints: Vec<Constraint>) -> Self {
        self.defaults = constraints;
        self
    }

    /// Builder method to set the reason policy.
    pub fn with_reason_policy(mut self, policy: ReasonPolicy) -> Self {
        self.reason_policy = policy;
        self
    }

    /// Parses a rule set from YAML text. An empty document is an empty rule set.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| PipelineError::Yaml {
            context: "Invalid rule document".to_string(),
            source: e,
        })
    }

    /// Loads a rule set from a YAML file.
    ///
    /// # Errors
    /// A missing file is a configuration error; an unreadable or malformed
    /// file is reported with its path.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::configuration(format!(
                "Rules file not found: {}",
                path.display()
            )));
        }
        let text =
            std::fs::read_to_string(path).map_err(|e| PipelineError::io("read", path, e))?;
        let rules = Self::from_yaml_str(&text).map_err(|e| match e {
            PipelineError::Yaml { source, .. } => PipelineError::Yaml {
                context: format!("Invalid rule document {}", path.display()),
                source,
            },
            other => other,
        })?;
        tracing::debug!(
            "Loaded {} column rule(s) from {}",
            rules.columns.len(),
            path.display()
        );
        Ok(rules)
    }

    /// Serializes the rule set as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| PipelineError::Yaml {
            context: "Failed to serialize rule document".to_string(),
            source: e,
        })
    }

    /// A starter document for the bundled customer sample data.
    pub fn starter() -> Self {
        Self::new()
            .with_column(
                "customer_id",
                vec![
                    Constraint::NotNull,
                    Constraint::Pattern {
                        regex: r"C\d{5}".to_string(),
                    },
                ],
            )
            .with_column("email", vec![Constraint::NotNull])
            .with_column(
                "age",
                vec![Constraint::Range {
                    min: Some(0.0),
                    max: Some(120.0),
                }],
            )
            .with_column(
                "country",
                vec![Constraint::AllowedSet {
                    values: ["USA", "CAN", "UK", "IND"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                }],
            )
    }
}
