//! In-memory tabular data model.
//!
//! A [`RecordTable`] is an ordered list of unique column names plus an
//! ordered list of rows, each row holding one [`Value`] per column. Every
//! pipeline stage borrows a table and produces new tables; nothing mutates a
//! stage's input.

use std::collections::HashSet;
use std::io::Write;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::{PipelineError, Result};

/// Name of the trailing column that carries the reason a row was quarantined.
pub const FAILURE_REASON_COLUMN: &str = "failure_reason";

/// Field tokens read as missing values, matching the default NA set of
/// common dataframe CSV readers.
pub const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Date and date-time layouts recognized when classifying text columns.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing value
    Null,
    /// Numeric value
    Number(f64),
    /// Free text
    Text(String),
}

impl Value {
    /// Builds a value from a raw CSV field, mapping NA tokens to `Null`.
    pub fn from_field(raw: &str) -> Self {
        if NA_TOKENS.contains(&raw) {
            Value::Null
        } else {
            Value::Text(raw.to_string())
        }
    }

    /// Converts a JSON scalar into a cell value.
    ///
    /// Nested arrays and objects are kept as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Text(b.to_string()),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    /// Returns true for missing values.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the numeric value if this cell holds a finite number.
    ///
    /// Non-finite numbers are rejected so they never poison statistics.
    pub fn as_finite_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    /// Renders the value the way it is written to CSV. `Null` renders empty.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }

    /// Returns a hashable key with full-equality semantics.
    pub(crate) fn key(&self) -> ValueKey {
        match self {
            Value::Null => ValueKey::Null,
            Value::Number(n) if n.is_nan() => ValueKey::Number(f64::NAN.to_bits()),
            // -0.0 and 0.0 compare equal
            Value::Number(n) if *n == 0.0 => ValueKey::Number(0.0_f64.to_bits()),
            Value::Number(n) => ValueKey::Number(n.to_bits()),
            Value::Text(s) => ValueKey::Text(s.clone()),
        }
    }
}

/// Hashable mirror of [`Value`] used for duplicate detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    Null,
    Number(u64),
    Text(String),
}

/// Formats a number so integral values print without a fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Returns true when the text parses as an ISO-8601 date or date-time.
pub fn parses_as_datetime(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || DateTime::parse_from_rfc3339(text).is_ok()
    {
        return true;
    }
    DATETIME_FORMATS
        .iter()
        .any(|format| NaiveDateTime::parse_from_str(text, format).is_ok())
}

/// Physical storage type of a column, derived from its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Every non-null value is a number (an all-null column counts as numeric)
    Numeric,
    /// Every non-null value is text holding an ISO-8601 date or date-time
    Datetime,
    /// Anything else
    Text,
}

/// An ordered table of rows sharing one column set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordTable {
    /// Column names in header order
    pub columns: Vec<String>,
    /// Rows, each aligned with `columns`
    pub rows: Vec<Vec<Value>>,
}

impl RecordTable {
    /// Creates an empty table with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Creates a table from rows, checking that the shape is consistent.
    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let table = Self { columns, rows };
        table.check_shape()?;
        Ok(table)
    }

    /// Builds a typed table from raw text records.
    ///
    /// NA tokens become `Null`; a column whose non-null fields all parse as
    /// numbers is stored as numbers. Records shorter than the header are
    /// padded with `Null`.
    pub fn from_text_records(columns: Vec<String>, records: Vec<Vec<String>>) -> Result<Self> {
        let width = columns.len();
        let mut rows: Vec<Vec<Value>> = records
            .into_iter()
            .map(|record| {
                let mut row: Vec<Value> =
                    record.iter().map(|field| Value::from_field(field)).collect();
                if row.len() < width {
                    row.resize(width, Value::Null);
                }
                row
            })
            .collect();

        for idx in 0..columns.len() {
            let numeric = rows.iter().all(|row| match row.get(idx) {
                Some(Value::Text(s)) => s.trim().parse::<f64>().is_ok(),
                _ => true,
            });
            if !numeric {
                continue;
            }
            for row in &mut rows {
                if let Some(cell) = row.get_mut(idx)
                    && let Value::Text(s) = cell
                    && let Ok(parsed) = s.trim().parse::<f64>()
                {
                    *cell = Value::Number(parsed);
                }
            }
        }

        Self::with_rows(columns, rows)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at a row for a named column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Iterates the values of one column; short rows yield `Null`.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows
            .iter()
            .map(move |row| row.get(idx).unwrap_or(&Value::Null))
    }

    /// Derives the storage type of a column from its values.
    pub fn storage_type(&self, idx: usize) -> StorageType {
        let mut saw_number = false;
        let mut saw_text = false;
        let mut all_datetime = true;

        for value in self.column_values(idx) {
            match value {
                Value::Null => {}
                Value::Number(_) => saw_number = true,
                Value::Text(s) => {
                    saw_text = true;
                    if all_datetime && !parses_as_datetime(s) {
                        all_datetime = false;
                    }
                }
            }
        }

        match (saw_number, saw_text) {
            (_, false) => StorageType::Numeric,
            (false, true) if all_datetime => StorageType::Datetime,
            _ => StorageType::Text,
        }
    }

    /// Verifies column names are unique and every row matches the column count.
    pub fn check_shape(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.columns.len());
        for column in &self.columns {
            if !seen.insert(column.as_str()) {
                return Err(PipelineError::malformed(format!(
                    "duplicate column name '{}'",
                    column
                )));
            }
        }
        if let Some((idx, row)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != self.columns.len())
        {
            return Err(PipelineError::malformed(format!(
                "row {} has {} values, expected {}",
                idx,
                row.len(),
                self.columns.len()
            )));
        }
        Ok(())
    }

    /// Returns a new table with the rows at `indices`, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Returns the rows at `indices` with a trailing failure reason column.
    pub fn select_annotated(&self, indices: &[usize], reasons: &[String]) -> Self {
        let mut columns = self.columns.clone();
        columns.push(FAILURE_REASON_COLUMN.to_string());

        let rows = indices
            .iter()
            .zip(reasons)
            .filter_map(|(&i, reason)| {
                self.rows.get(i).map(|row| {
                    let mut row = row.clone();
                    row.push(Value::Text(reason.clone()));
                    row
                })
            })
            .collect();

        Self { columns, rows }
    }

    /// Writes the table as CSV with a header row.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer
            .write_record(&self.columns)
            .map_err(|e| PipelineError::csv("Failed to write CSV header", e))?;
        for row in &self.rows {
            csv_writer
                .write_record(row.iter().map(Value::render))
                .map_err(|e| PipelineError::csv("Failed to write CSV record", e))?;
        }
        csv_writer.flush().map_err(|e| PipelineError::Io {
            context: "Failed to flush CSV output".to_string(),
            source: e,
        })?;
        Ok(())
    }
}
