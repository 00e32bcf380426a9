//! Relational sink tests against in-memory SQLite.
//!
//! This test suite covers:
//! - Table replacement on repeated loads
//! - NULL handling and value rendering
//! - Identifier sanitization of target and column names
//! - Failure reporting through `persist_clean_table`

#![cfg(feature = "sqlite")]

use tablesieve_core::{
    PipelineError, RecordTable, Result, SinkStatus, SqlSink, TableSink, Value,
    persist_clean_table,
};

fn orders(rows: &[(&str, Option<f64>)]) -> RecordTable {
    RecordTable::with_rows(
        vec!["order id".into(), "amount".into()],
        rows.iter()
            .map(|(id, amount)| {
                vec![
                    Value::Text((*id).to_string()),
                    amount.map_or(Value::Null, Value::Number),
                ]
            })
            .collect(),
    )
    .unwrap()
}

async fn count_rows(sink: &SqlSink, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM \"{}\"", table))
        .fetch_one(sink.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_load_creates_table() -> Result<()> {
    let sink = SqlSink::connect("sqlite::memory:").await?;
    let table = orders(&[("O1", Some(10.5)), ("O2", None), ("O3", Some(7.0))]);

    let loaded = sink.load(&table, "clean_orders").await?;
    assert_eq!(loaded, 3);
    assert_eq!(count_rows(&sink, "clean_orders").await, 3);

    let values: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT order_id, amount FROM clean_orders ORDER BY order_id")
            .fetch_all(sink.pool())
            .await
            .unwrap();
    assert_eq!(
        values,
        vec![
            ("O1".to_string(), Some("10.5".to_string())),
            ("O2".to_string(), None),
            ("O3".to_string(), Some("7".to_string())),
        ]
    );

    sink.close().await;
    Ok(())
}

#[tokio::test]
async fn test_load_replaces_previous_contents() -> Result<()> {
    let sink = SqlSink::connect("sqlite::memory:").await?;

    sink.load(&orders(&[("O1", Some(1.0)), ("O2", Some(2.0))]), "t")
        .await?;
    sink.load(&orders(&[("O9", Some(9.0))]), "t").await?;

    assert_eq!(count_rows(&sink, "t").await, 1);
    Ok(())
}

#[tokio::test]
async fn test_load_empty_table() -> Result<()> {
    let sink = SqlSink::connect("sqlite::memory:").await?;
    let loaded = sink.load(&orders(&[]), "empty_clean").await?;

    assert_eq!(loaded, 0);
    assert_eq!(count_rows(&sink, "empty_clean").await, 0);
    Ok(())
}

#[tokio::test]
async fn test_target_name_is_sanitized() -> Result<()> {
    let sink = SqlSink::connect("sqlite::memory:").await?;
    sink.load(&orders(&[("O1", None)]), "clean; DROP TABLE x")
        .await?;

    assert_eq!(count_rows(&sink, "clean__DROP_TABLE_x").await, 1);
    Ok(())
}

#[tokio::test]
async fn test_invalid_target_name_rejected() {
    let sink = SqlSink::connect("sqlite::memory:").await.unwrap();
    let result = sink.load(&orders(&[]), "!!!").await;
    assert!(matches!(result, Err(PipelineError::Configuration { .. })));
}

#[tokio::test]
async fn test_unsupported_scheme_rejected() {
    let result = SqlSink::connect("mongodb://localhost:27017/db").await;
    assert!(matches!(result, Err(PipelineError::Configuration { .. })));
}

#[tokio::test]
async fn test_persist_reports_status() {
    let sink = SqlSink::connect("sqlite::memory:").await.unwrap();

    let status = persist_clean_table(&sink, &orders(&[("O1", Some(3.0))]), "clean").await;
    assert_eq!(
        status,
        SinkStatus::Loaded {
            table: "clean".to_string(),
            rows: 1
        }
    );

    let status = persist_clean_table(&sink, &orders(&[]), "***").await;
    assert!(matches!(status, SinkStatus::Failed { .. }));
}
