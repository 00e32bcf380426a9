//! Robust CSV loading.
//!
//! Input files come from many tools, so the raw bytes are decoded as strict
//! UTF-8 (a leading BOM is dropped) and otherwise as Windows-1252, a superset
//! of Latin-1. Windows-1252 maps every byte, so it is the last encoding tried.

use std::borrow::Cow;
use std::path::Path;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::models::RecordTable;
use crate::{PipelineError, Result};

/// A parsed table plus the encoding that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTable {
    /// The parsed table
    pub table: RecordTable,
    /// Name of the encoding used to decode the file
    pub encoding: String,
}

/// Reads and parses a CSV file, trying each supported encoding in turn.
///
/// # Errors
/// Returns an input error when the file cannot be read, has no header
/// columns, or fails to parse under every encoding.
pub fn load_table(path: &Path) -> Result<LoadedTable> {
    let bytes = std::fs::read(path).map_err(|e| {
        PipelineError::input_with(format!("Could not read input file {}", path.display()), e)
    })?;
    decode_table(&bytes).map_err(|e| match e {
        PipelineError::Input { context, source } => PipelineError::Input {
            context: format!("{} ({})", context, path.display()),
            source,
        },
        other => other,
    })
}

/// Decodes and parses CSV bytes, trying each supported encoding in turn.
pub fn decode_table(bytes: &[u8]) -> Result<LoadedTable> {
    let mut last_error = None;

    for encoding in [UTF_8, WINDOWS_1252] {
        let Some(text) = decode_strict(encoding, bytes) else {
            tracing::debug!("Input is not valid {}", encoding.name());
            continue;
        };
        match parse_csv_text(&text) {
            Ok(table) => {
                if encoding != UTF_8 {
                    tracing::warn!("Input decoded as {}", encoding.name());
                }
                return Ok(LoadedTable {
                    table,
                    encoding: encoding.name().to_string(),
                });
            }
            Err(e) => {
                tracing::debug!("Parsing as {} failed: {}", encoding.name(), e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| PipelineError::input("Input could not be decoded")))
}

fn decode_strict<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
    let (text, had_errors) = if encoding == UTF_8 {
        encoding.decode_with_bom_removal(bytes)
    } else {
        encoding.decode_without_bom_handling(bytes)
    };
    (!had_errors).then_some(text)
}

/// Parses CSV text with a header row into a typed table.
///
/// Duplicate header names get a `.N` suffix and blank header names become
/// `Unnamed: <position>`, so column names are always unique. Short records
/// are padded with nulls; a record with more fields than the header is an
/// input error.
pub fn parse_csv_text(text: &str) -> Result<RecordTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::input_with("Could not parse CSV header", e))?
        .clone();
    if headers.is_empty() {
        return Err(PipelineError::input("No columns to parse from file"));
    }
    let columns = unique_headers(headers.iter());

    let records = reader
        .records()
        .map(|record| {
            let record =
                record.map_err(|e| PipelineError::input_with("Could not parse CSV record", e))?;
            if record.len() > columns.len() {
                let line = record.position().map_or(0, csv::Position::line);
                return Err(PipelineError::input(format!(
                    "Expected {} fields in line {}, saw {}",
                    columns.len(),
                    line,
                    record.len()
                )));
            }
            Ok(record.iter().map(str::to_string).collect::<Vec<_>>())
        })
        .collect::<Result<Vec<_>>>()?;

    RecordTable::from_text_records(columns, records)
}

fn unique_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for (idx, name) in raw.enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {}", idx)
        } else {
            name.to_string()
        };
        let mut candidate = base.clone();
        let mut suffix: usize = 1;
        while columns.contains(&candidate) {
            candidate = format!("{}.{}", base, suffix);
            suffix = suffix.saturating_add(1);
        }
        columns.push(candidate);
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    #[test]
    fn test_utf8_with_bom() {
        let bytes = b"\xEF\xBB\xBFid,name\n1,Zo\xC3\xAB\n";
        let loaded = decode_table(bytes).unwrap();
        assert_eq!(loaded.encoding, "UTF-8");
        assert_eq!(loaded.table.columns, vec!["id", "name"]);
        assert_eq!(loaded.table.rows[0][1], Value::Text("Zoë".to_string()));
    }

    #[test]
    fn test_latin1_fallback() {
        // 0xE9 is 'é' in Latin-1 and invalid as a lone UTF-8 byte
        let bytes = b"id,city\n1,Montr\xE9al\n";
        let loaded = decode_table(bytes).unwrap();
        assert_eq!(loaded.encoding, "windows-1252");
        assert_eq!(loaded.table.rows[0][1], Value::Text("Montréal".to_string()));
    }

    #[test]
    fn test_header_only_is_empty_table() {
        let loaded = decode_table(b"customer_id,email\n").unwrap();
        assert_eq!(loaded.table.columns.len(), 2);
        assert!(loaded.table.is_empty());
    }

    #[test]
    fn test_empty_file_is_not_tabular() {
        let result = decode_table(b"");
        assert!(matches!(result, Err(PipelineError::Input { .. })));
    }

    #[test]
    fn test_any_non_utf8_bytes_decode_as_windows_1252() {
        let loaded = decode_table(b"id,code\n1,\x81\x8D\x90\n").unwrap();
        assert_eq!(loaded.encoding, "windows-1252");
        assert_eq!(loaded.table.len(), 1);
        assert!(matches!(&loaded.table.rows[0][1], Value::Text(s) if s.chars().count() == 3));
    }

    #[test]
    fn test_short_rows_padded_with_null() {
        let loaded = decode_table(b"customer_id,email,age\nC00001,a@x.io,30\nC00002,b@x.io\n")
            .unwrap();
        assert_eq!(loaded.table.len(), 2);
        assert_eq!(loaded.table.rows[0][2], Value::Number(30.0));
        assert_eq!(loaded.table.rows[1][1], Value::Text("b@x.io".to_string()));
        assert_eq!(loaded.table.rows[1][2], Value::Null);
    }

    #[test]
    fn test_long_rows_rejected() {
        let err = decode_table(b"a,b\n1,2\n3,4,5\n").unwrap_err();
        assert!(matches!(err, PipelineError::Input { .. }));
        assert!(err.to_string().contains("Expected 2 fields in line 3, saw 3"));
    }

    #[test]
    fn test_header_names_made_unique() {
        let table = parse_csv_text("a,a,,b,a\n1,2,3,4,5\n").unwrap();
        assert_eq!(table.columns, vec!["a", "a.1", "Unnamed: 2", "b", "a.2"]);
    }

    #[test]
    fn test_quoted_fields_and_blank_lines() {
        let table = parse_csv_text("id,note\n1,\"x, y\"\n\n2,\"say \"\"hi\"\"\"\n").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][1], Value::Text("x, y".to_string()));
        assert_eq!(table.rows[1][1], Value::Text("say \"hi\"".to_string()));
    }

    #[test]
    fn test_load_table_missing_file() {
        let result = load_table(Path::new("/nonexistent/input.csv"));
        assert!(matches!(result, Err(PipelineError::Input { .. })));
    }

    #[test]
    fn test_load_table_from_disk() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("orders.csv");
        std::fs::write(&path, "order_id,amount\nO000001,25.5\nO000002,\n").unwrap();

        let loaded = load_table(&path).unwrap();
        assert_eq!(loaded.table.len(), 2);
        assert_eq!(loaded.table.rows[0][1], Value::Number(25.5));
        assert_eq!(loaded.table.rows[1][1], Value::Null);
    }
}
