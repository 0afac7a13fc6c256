//! Store layer on embedded DuckDB
//!
//! This module provides:
//! - `duckdb`: the backend and its connection handling
//! - `schema`: DDL for the ingest log, metadata, catalog and per-collection
//!   raw/production relations
//! - `ingest_log`: two-phase ingest writes
//! - `staging`: the as-of rebuild of production relations and metadata
//! - `read`: filtered, cursor-paginated reads and read-only summaries
//!
//! All relations except `{collection}_prod`, `_metadata` and
//! `_table_catalog` are append-only. Staging replaces those three inside one
//! transaction.

use serde::{Deserialize, Serialize};

pub mod duckdb;
pub mod ingest_log;
pub mod read;
pub mod schema;
pub mod staging;

pub use self::duckdb::DuckDBBackend;
pub use read::ReadRequest;
pub use schema::StoreSchema;
pub use staging::StageReport;

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to open the database or take the connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Creating relations failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Writing an ingest batch failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// A staging run failed and was rolled back
    #[error("Staging failed: {0}")]
    StagingFailed(String),

    /// Transaction control failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Query result row as a JSON value
pub type QueryRow = serde_json::Value;

/// Query result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<QueryRow>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new query result
    pub fn new(columns: Vec<String>, rows: Vec<QueryRow>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    /// Build a result from serializable records, taking columns from the first
    pub fn from_records<T: Serialize>(records: &[T]) -> Self {
        let rows: Vec<QueryRow> = records
            .iter()
            .filter_map(|r| serde_json::to_value(r).ok())
            .collect();
        let columns = rows
            .first()
            .and_then(|r| r.as_object())
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        Self::new(columns, rows)
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Format query results for display
pub fn format_query_result(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&result.rows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => format_as_csv(result),
        OutputFormat::Table => format_as_table(result),
    }
}

fn cell_text(row: &QueryRow, col: &str, null: &str) -> String {
    match row.get(col).unwrap_or(&serde_json::Value::Null) {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => null.to_string(),
        other => other.to_string(),
    }
}

fn format_as_csv(result: &QueryResult) -> String {
    let mut output = result.columns.join(",");
    output.push('\n');

    for row in &result.rows {
        let values: Vec<String> = result
            .columns
            .iter()
            .map(|col| {
                let s = cell_text(row, col, "");
                if s.contains(',') || s.contains('"') || s.contains('\n') {
                    format!("\"{}\"", s.replace('"', "\"\""))
                } else {
                    s
                }
            })
            .collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    output
}

fn format_as_table(result: &QueryResult) -> String {
    if result.is_empty() {
        return "(0 rows)".to_string();
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(|col| cell_text(row, col, "null"))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let line = |values: &[String]| -> String {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{:width$}", v, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut output = line(&result.columns);
    output.push('\n');
    output.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    output.push('\n');
    for row in &cells {
        output.push_str(&line(row));
        output.push('\n');
    }

    output.push_str(&format!("({} rows)", result.row_count()));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("table").unwrap(), OutputFormat::Table);
        assert_eq!(OutputFormat::from_str("JSON").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_str("csv").unwrap(), OutputFormat::Csv);
        assert!(OutputFormat::from_str("xlsx").is_err());
    }

    #[test]
    fn test_format_as_table() {
        let result = QueryResult::new(
            vec!["table_name".to_string(), "value".to_string()],
            vec![
                serde_json::json!({"table_name": "1.1", "value": 10.5}),
                serde_json::json!({"table_name": "1.2", "value": null}),
            ],
        );

        let output = format_as_table(&result);
        assert!(output.contains("table_name"));
        assert!(output.contains("10.5"));
        assert!(output.contains("null"));
        assert!(output.contains("(2 rows)"));
    }

    #[test]
    fn test_format_as_csv_quotes_commas() {
        let result = QueryResult::new(
            vec!["fuel".to_string(), "unit".to_string()],
            vec![serde_json::json!({"fuel": "Coal, coke", "unit": "ktoe"})],
        );

        let output = format_as_csv(&result);
        assert!(output.starts_with("fuel,unit\n"));
        assert!(output.contains("\"Coal, coke\",ktoe"));
    }

    #[test]
    fn test_from_records_takes_columns_from_first() {
        #[derive(Serialize)]
        struct Row {
            table_name: &'static str,
            row_count: i64,
        }
        let result = QueryResult::from_records(&[Row {
            table_name: "1.1",
            row_count: 3,
        }]);
        assert_eq!(result.columns, vec!["table_name", "row_count"]);
        assert_eq!(result.row_count(), 1);
    }
}
