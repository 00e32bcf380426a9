//! Quarantine merging.
//!
//! Invalid rows from rule validation and anomalous rows from the detector are
//! combined into one deduplicated quarantine table. Collaborators may hand
//! over their rows in several shapes; each accepted shape is a variant of
//! [`QuarantineInput`] with its own conversion, and anything that cannot be
//! converted contributes nothing.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::Result;
use crate::artifacts::{RunStamp, write_artifact};
use crate::models::{FAILURE_REASON_COLUMN, RecordTable, Value};

/// Label of quarantine artifacts.
pub const QUARANTINE_LABEL: &str = "quarantine";

/// Accepted shapes of rows handed to the merger.
#[derive(Debug, Clone, PartialEq)]
pub enum QuarantineInput {
    /// A complete table
    Table(RecordTable),
    /// A sequence of inputs; the first table wins, otherwise the first
    /// element is converted
    Sequence(Vec<QuarantineInput>),
    /// A single row keyed by column name
    Record(BTreeMap<String, Value>),
    /// Several rows keyed by column name
    Rows(Vec<BTreeMap<String, Value>>),
    /// Arbitrary JSON: an array of objects, or an object of equal-length
    /// arrays
    Unrecognized(serde_json::Value),
}

impl From<RecordTable> for QuarantineInput {
    fn from(table: RecordTable) -> Self {
        QuarantineInput::Table(table)
    }
}

impl From<serde_json::Value> for QuarantineInput {
    fn from(value: serde_json::Value) -> Self {
        QuarantineInput::Unrecognized(value)
    }
}

impl QuarantineInput {
    /// Converts the input into a table, or `None` when it has no table form.
    pub fn into_table(self) -> Option<RecordTable> {
        match self {
            QuarantineInput::Table(table) => Some(table),
            QuarantineInput::Sequence(items) => sequence_to_table(items),
            QuarantineInput::Record(record) => Some(rows_to_table(vec![record])),
            QuarantineInput::Rows(rows) => Some(rows_to_table(rows)),
            QuarantineInput::Unrecognized(value) => json_to_table(&value),
        }
    }
}

fn sequence_to_table(items: Vec<QuarantineInput>) -> Option<RecordTable> {
    let table_position = items
        .iter()
        .position(|item| matches!(item, QuarantineInput::Table(_)));
    let chosen = match table_position {
        Some(idx) => items.into_iter().nth(idx),
        None => items.into_iter().next(),
    };
    chosen.and_then(QuarantineInput::into_table)
}

/// Builds a table from keyed rows; columns appear in first-seen order and
/// missing cells are null.
fn rows_to_table(rows: Vec<BTreeMap<String, Value>>) -> RecordTable {
    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    let aligned = rows
        .into_iter()
        .map(|mut row| {
            columns
                .iter()
                .map(|c| row.remove(c).unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    RecordTable {
        columns,
        rows: aligned,
    }
}

fn json_to_table(value: &serde_json::Value) -> Option<RecordTable> {
    match value {
        serde_json::Value::Array(items) => {
            let rows = items
                .iter()
                .map(|item| {
                    item.as_object().map(|object| {
                        object
                            .iter()
                            .map(|(k, v)| (k.clone(), Value::from_json(v)))
                            .collect::<BTreeMap<_, _>>()
                    })
                })
                .collect::<Option<Vec<_>>>()?;
            Some(rows_to_table(rows))
        }
        serde_json::Value::Object(object) => {
            let columns: Vec<(&String, &Vec<serde_json::Value>)> = object
                .iter()
                .map(|(k, v)| v.as_array().map(|values| (k, values)))
                .collect::<Option<Vec<_>>>()?;
            let height = columns.first().map_or(0, |(_, values)| values.len());
            if columns.iter().any(|(_, values)| values.len() != height) {
                return None;
            }
            let rows = (0..height)
                .map(|i| {
                    columns
                        .iter()
                        .map(|(_, values)| Value::from_json(&values[i]))
                        .collect()
                })
                .collect();
            Some(RecordTable {
                columns: columns.iter().map(|(k, _)| (*k).clone()).collect(),
                rows,
            })
        }
        _ => None,
    }
}

/// Converts an optional input into a non-empty, well-formed table.
fn contribution(input: Option<QuarantineInput>, name: &str) -> Option<RecordTable> {
    let table = input?.into_table();
    match table {
        Some(table) if table.check_shape().is_err() => {
            tracing::warn!("Skipping {} quarantine input: inconsistent shape", name);
            None
        }
        Some(table) if !table.is_empty() => Some(table),
        Some(_) => None,
        None => {
            tracing::debug!("Skipping {} quarantine input: no table form", name);
            None
        }
    }
}

/// Column union of the parts in first-seen order, `failure_reason` last.
fn merged_columns(parts: &[RecordTable]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for part in parts {
        for column in &part.columns {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
    }
    if let Some(idx) = columns.iter().position(|c| c == FAILURE_REASON_COLUMN) {
        let reason = columns.remove(idx);
        columns.push(reason);
    }
    columns
}

/// Merges invalid and anomalous rows.
///
/// Parts are concatenated (invalid first) with columns aligned by name, then
/// exact duplicate rows are removed keeping the first occurrence. Returns
/// `None` when neither input contributes a row.
pub fn merge_quarantine(
    bad: Option<QuarantineInput>,
    anomalies: Option<QuarantineInput>,
) -> Option<RecordTable> {
    let parts: Vec<RecordTable> = [
        contribution(bad, "invalid"),
        contribution(anomalies, "anomalous"),
    ]
    .into_iter()
    .flatten()
    .collect();
    if parts.is_empty() {
        return None;
    }

    let columns = merged_columns(&parts);
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for part in &parts {
        let positions: Vec<Option<usize>> =
            columns.iter().map(|c| part.column_index(c)).collect();
        for row in &part.rows {
            let aligned: Vec<Value> = positions
                .iter()
                .map(|pos| pos.and_then(|p| row.get(p)).cloned().unwrap_or(Value::Null))
                .collect();
            let key: Vec<_> = aligned.iter().map(Value::key).collect();
            if seen.insert(key) {
                rows.push(aligned);
            }
        }
    }

    Some(RecordTable { columns, rows })
}

/// Writes a merged quarantine table as `quarantine_<ts>.csv` in `dir`.
pub fn write_quarantine(table: &RecordTable, dir: &Path, stamp: &RunStamp) -> Result<PathBuf> {
    let path = write_artifact(dir, QUARANTINE_LABEL, "csv", stamp, |w| table.write_csv(w))?;
    tracing::info!("Quarantined {} row(s) to {}", table.len(), path.display());
    Ok(path)
}

/// Merges and writes quarantined rows.
///
/// Returns `Ok(None)` without touching the filesystem when there is nothing
/// to quarantine. `dir` must already exist.
pub fn quarantine_rows(
    bad: Option<QuarantineInput>,
    anomalies: Option<QuarantineInput>,
    dir: &Path,
) -> Result<Option<PathBuf>> {
    match merge_quarantine(bad, anomalies) {
        Some(table) => write_quarantine(&table, dir, &RunStamp::now()).map(Some),
        None => Ok(None),
    }
}
