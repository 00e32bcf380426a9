//! Semantic type inference for record tables.
//!
//! Each column is classified once per run into one of four semantic types.
//! The checks run in a fixed order and the first match wins:
//! 1. numeric storage → [`SemanticType::Numeric`]
//! 2. datetime storage → [`SemanticType::Datetime`]
//! 3. fewer distinct non-null values than the categorical threshold →
//!    [`SemanticType::Categorical`]
//! 4. otherwise → [`SemanticType::String`]

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::models::{RecordTable, StorageType};

/// Distinct-value count below which a text column is categorical.
pub const DEFAULT_CATEGORICAL_THRESHOLD: usize = 20;

/// Logical category of a column, independent of its raw storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    /// Numeric measurements
    Numeric,
    /// Dates and timestamps
    Datetime,
    /// Low-cardinality labels
    Categorical,
    /// Free text or high-cardinality identifiers
    String,
}

impl std::fmt::Display for SemanticType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SemanticType::Numeric => "numeric",
            SemanticType::Datetime => "datetime",
            SemanticType::Categorical => "categorical",
            SemanticType::String => "string",
        };
        f.write_str(name)
    }
}

/// Classification result for a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredColumn {
    /// Column name
    pub name: String,
    /// Inferred semantic type
    pub semantic_type: SemanticType,
    /// Number of distinct non-null values
    pub distinct_count: usize,
    /// Number of null values
    pub null_count: usize,
}

/// Column name → semantic type mapping, in table column order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Per-column classification
    pub columns: Vec<InferredColumn>,
}

impl ColumnSchema {
    /// Semantic type of a named column.
    pub fn semantic_type(&self, name: &str) -> Option<SemanticType> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.semantic_type)
    }

    /// Names of the columns with the given semantic type.
    pub fn columns_of(&self, semantic_type: SemanticType) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.semantic_type == semantic_type)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Number of classified columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true when no column was classified.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Classifies the columns of a [`RecordTable`].
#[derive(Debug, Clone)]
pub struct SchemaInferencer {
    categorical_threshold: usize,
}

impl Default for SchemaInferencer {
    fn default() -> Self {
        Self {
            categorical_threshold: DEFAULT_CATEGORICAL_THRESHOLD,
        }
    }
}

impl SchemaInferencer {
    /// Creates an inferencer with the default categorical threshold.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the categorical threshold.
    pub fn with_categorical_threshold(mut self, threshold: usize) -> Self {
        self.categorical_threshold = threshold;
        self
    }

    /// Infers the column schema of a table.
    ///
    /// # Errors
    /// Returns `MalformedTable` when the table has duplicate column names or
    /// rows whose width differs from the header.
    pub fn infer(&self, table: &RecordTable) -> Result<ColumnSchema> {
        table.check_shape()?;

        let columns = table
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| self.classify(table, idx, name))
            .collect();

        Ok(ColumnSchema { columns })
    }

    fn classify(&self, table: &RecordTable, idx: usize, name: &str) -> InferredColumn {
        let mut distinct = HashSet::new();
        let mut null_count = 0usize;
        for value in table.column_values(idx) {
            if value.is_null() {
                null_count = null_count.saturating_add(1);
            } else {
                distinct.insert(value.key());
            }
        }

        let semantic_type = match table.storage_type(idx) {
            StorageType::Numeric => SemanticType::Numeric,
            StorageType::Datetime => SemanticType::Datetime,
            StorageType::Text if distinct.len() < self.categorical_threshold => {
                SemanticType::Categorical
            }
            StorageType::Text => SemanticType::String,
        };

        InferredColumn {
            name: name.to_string(),
            semantic_type,
            distinct_count: distinct.len(),
            null_count,
        }
    }
}

/// Infers a column schema with the default categorical threshold.
pub fn infer_schema(table: &RecordTable) -> Result<ColumnSchema> {
    SchemaInferencer::default().infer(table)
}
