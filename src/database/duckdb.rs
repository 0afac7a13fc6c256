//! DuckDB database backend implementation
//!
//! Provides the embedded store for ingest logs, raw and production relations.
//! Supports both file-based persistence and in-memory mode.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use duckdb::types::{Value, ValueRef};
use serde_json::Map;

use super::schema::{SCHEMA_VERSION, StoreSchema};
use super::{DatabaseError, DatabaseResult, QueryResult};
use crate::models::CollectionSchema;

/// DuckDB database backend
///
/// One connection, guarded by a mutex. Every write path holds the lock for
/// its whole unit of work, so a staging run never interleaves with an
/// ingest or another staging run.
pub struct DuckDBBackend {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
}

impl DuckDBBackend {
    /// Create a new DuckDB backend with a file-based database
    pub fn new(db_path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to open DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    /// Create an in-memory DuckDB backend
    ///
    /// Useful for testing or throwaway stores where persistence is not needed.
    pub fn in_memory() -> DatabaseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    /// Take the connection for a unit of work
    pub(super) fn lock(&self) -> DatabaseResult<MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    /// Execute multiple SQL statements
    fn execute_batch(&self, sql: &str) -> DatabaseResult<()> {
        self.lock()?
            .execute_batch(sql)
            .map_err(|e| DatabaseError::MigrationFailed(format!("Batch execute failed: {}", e)))
    }

    /// Create the ingest log, metadata and catalog relations
    pub fn initialize(&self) -> DatabaseResult<()> {
        self.execute_batch(StoreSchema::create_tables_sql())?;

        self.lock()?
            .execute(
                "INSERT INTO schema_version (version) VALUES (?) ON CONFLICT (version) DO NOTHING",
                [SCHEMA_VERSION],
            )
            .map_err(|e| {
                DatabaseError::MigrationFailed(format!("Failed to record schema version: {}", e))
            })?;

        Ok(())
    }

    /// Create a collection's raw relation and an empty production relation
    ///
    /// Columns added to the collection schema since the raw relation was
    /// created are added to it.
    pub fn ensure_collection(&self, schema: &CollectionSchema) -> DatabaseResult<()> {
        let sql = format!(
            "{}\n{}\n{}",
            StoreSchema::create_raw_sql(schema),
            StoreSchema::add_raw_columns_sql(schema),
            StoreSchema::create_prod_sql(schema, true)
        );
        tracing::debug!(collection = %schema.name, "ensuring collection relations");
        self.execute_batch(&sql)
    }

    /// Execute a SQL query and return results
    pub fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        self.execute_query_params(sql, &[])
    }

    /// Execute a parameterized SQL query with positional `?` placeholders
    pub fn execute_query_params(&self, sql: &str, params: &[Value]) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();
        let conn = self.lock()?;
        let (columns, rows) = query_rows(&conn, sql, params)?;

        Ok(QueryResult {
            columns,
            rows: rows.into_iter().map(serde_json::Value::Object).collect(),
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Check the connection answers queries
    pub fn health_check(&self) -> DatabaseResult<bool> {
        let conn = self.lock()?;
        let one: i32 = conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .map_err(|e| DatabaseError::QueryFailed(format!("Health check failed: {}", e)))?;
        Ok(one == 1)
    }
}

/// Run a query on a held connection, returning column names and JSON rows
pub(super) fn query_rows(
    conn: &duckdb::Connection,
    sql: &str,
    params: &[Value],
) -> DatabaseResult<(Vec<String>, Vec<Map<String, serde_json::Value>>)> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;

    // In DuckDB 1.4+, we need to execute the query first, then get columns
    let mut result_rows = stmt
        .query(duckdb::params_from_iter(params.iter()))
        .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

    let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
    let columns: Vec<String> = (0..column_count)
        .map(|i| {
            result_rows
                .as_ref()
                .and_then(|r| r.column_name(i).ok())
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("col{}", i))
        })
        .collect();

    let mut rows = Vec::new();
    while let Some(row) = result_rows
        .next()
        .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?
    {
        rows.push(row_to_json(row, &columns));
    }

    Ok((columns, rows))
}

/// Convert a DuckDB row to a JSON object keyed by column name
fn row_to_json(row: &duckdb::Row, columns: &[String]) -> Map<String, serde_json::Value> {
    columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let value = row
                .get_ref(i)
                .map(value_ref_to_json)
                .unwrap_or(serde_json::Value::Null);
            (name.clone(), value)
        })
        .collect()
}

/// Convert a DuckDB ValueRef to a JSON value
pub(super) fn value_ref_to_json(value: ValueRef) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        ValueRef::Null => Json::Null,
        ValueRef::Boolean(b) => Json::Bool(b),
        ValueRef::TinyInt(i) => i.into(),
        ValueRef::SmallInt(i) => i.into(),
        ValueRef::Int(i) => i.into(),
        ValueRef::BigInt(i) => i.into(),
        ValueRef::UTinyInt(i) => i.into(),
        ValueRef::USmallInt(i) => i.into(),
        ValueRef::UInt(i) => i.into(),
        ValueRef::UBigInt(i) => i.into(),
        // i128 may not fit in a JSON number
        ValueRef::HugeInt(i) => Json::String(i.to_string()),
        ValueRef::Float(f) => serde_json::Number::from_f64(f as f64)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        ValueRef::Double(f) => serde_json::Number::from_f64(f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        ValueRef::Decimal(d) => Json::String(d.to_string()),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned().into(),
        ValueRef::Blob(bytes) => {
            use base64::Engine;
            Json::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        other => Json::String(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDef, SqlType};

    fn schema() -> CollectionSchema {
        CollectionSchema::new(
            "dukes",
            vec![
                ColumnDef::new("year", SqlType::Integer, false),
                ColumnDef::new("value", SqlType::Real, true),
            ],
        )
    }

    #[test]
    fn test_in_memory_database() {
        let backend = DuckDBBackend::in_memory().unwrap();
        assert!(backend.is_in_memory());
        assert!(backend.db_path().is_none());
        assert!(backend.health_check().unwrap());
    }

    #[test]
    fn test_initialize_is_repeatable() {
        let backend = DuckDBBackend::in_memory().unwrap();
        backend.initialize().unwrap();
        backend.initialize().unwrap();

        let result = backend
            .execute_query(
                "SELECT table_name FROM information_schema.tables WHERE table_schema = 'main' ORDER BY table_name",
            )
            .unwrap();
        let names: Vec<&str> = result
            .rows
            .iter()
            .filter_map(|r| r["table_name"].as_str())
            .collect();
        assert!(names.contains(&"_ingest_log"));
        assert!(names.contains(&"_metadata"));
        assert!(names.contains(&"_table_catalog"));
    }

    #[test]
    fn test_ensure_collection_creates_raw_and_prod() {
        let backend = DuckDBBackend::in_memory().unwrap();
        backend.initialize().unwrap();
        backend.ensure_collection(&schema()).unwrap();
        backend.ensure_collection(&schema()).unwrap();

        let result = backend.execute_query("SELECT * FROM dukes_prod").unwrap();
        assert!(result.is_empty());
        assert_eq!(
            result.columns,
            vec![
                "row_id",
                "ingest_id",
                "ingest_ts",
                "table_description",
                "table_name",
                "year",
                "value"
            ]
        );
    }

    #[test]
    fn test_ensure_collection_adds_new_columns() {
        let backend = DuckDBBackend::in_memory().unwrap();
        backend.initialize().unwrap();
        backend.ensure_collection(&schema()).unwrap();

        let mut extended = schema();
        extended
            .columns
            .push(ColumnDef::new("unit", SqlType::Text, true));
        backend.ensure_collection(&extended).unwrap();

        let result = backend.execute_query("SELECT * FROM dukes_raw").unwrap();
        assert!(result.columns.contains(&"unit".to_string()));
    }

    #[test]
    fn test_query_params_are_bound() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let result = backend
            .execute_query_params(
                "SELECT ? AS label, ? AS n",
                &[Value::Text("gas".to_string()), Value::BigInt(7)],
            )
            .unwrap();
        assert_eq!(result.rows[0]["label"], "gas");
        assert_eq!(result.rows[0]["n"], 7);
    }
}
