//! Read path over production relations
//!
//! Pages are keyed on `row_id`: a page holds rows with `row_id` greater than
//! the cursor, in ascending order. A full page carries the last `row_id` as
//! the next cursor; a short page ends the scan.

use duckdb::types::Value;
use serde_json::Map;

use super::duckdb::{DuckDBBackend, query_rows};
use super::schema::metadata_sql;
use super::{DatabaseError, DatabaseResult};
use crate::models::{
    CollectionSchema, ColumnMetadata, INGEST_ID_COLUMN, INGEST_TS_COLUMN, INTERNAL_COLUMNS,
    QueryResponse, ROW_ID_COLUMN, SqlType, SqlValue, StagedTableSummary,
    TABLE_DESCRIPTION_COLUMN, TABLE_NAME_COLUMN,
};
use crate::validation::input::quote_identifier;

/// Column summarised by `staged_summary` when the collection declares it
const YEAR_COLUMN: &str = "year";

/// One page request against a production relation
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    /// Boolean SQL expression with positional `?` placeholders
    pub where_sql: String,
    /// Values for the placeholders, in order
    pub params: Vec<SqlValue>,
    pub limit: usize,
    /// Exclusive lower bound on `row_id`
    pub cursor: Option<i64>,
}

impl ReadRequest {
    pub fn new(where_sql: impl Into<String>, params: Vec<SqlValue>, limit: usize) -> Self {
        Self {
            where_sql: where_sql.into(),
            params,
            limit,
            cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<i64>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Full statement and bound values for this page
    pub fn to_sql(&self, schema: &CollectionSchema) -> (String, Vec<Value>) {
        let row_id = quote_identifier(ROW_ID_COLUMN);
        let condition = if self.where_sql.trim().is_empty() {
            "TRUE"
        } else {
            self.where_sql.as_str()
        };

        let mut sql = format!(
            "SELECT * FROM {} WHERE ({})",
            quote_identifier(&schema.prod_relation()),
            condition
        );
        let mut params: Vec<Value> = self.params.iter().cloned().map(Value::from).collect();

        if let Some(cursor) = self.cursor {
            sql.push_str(&format!(" AND {} > ?", row_id));
            params.push(Value::BigInt(cursor));
        }
        sql.push_str(&format!(" ORDER BY {} LIMIT ?", row_id));
        params.push(Value::BigInt(self.limit as i64));

        (sql, params)
    }
}

/// Shape a page of production rows into a response
///
/// Bookkeeping columns are stripped and columns null on every row of the
/// page are dropped.
fn shape_page(rows: Vec<Map<String, serde_json::Value>>, limit: usize) -> QueryResponse {
    let next_cursor = if limit > 0 && rows.len() == limit {
        rows.last()
            .and_then(|r| r.get(ROW_ID_COLUMN))
            .and_then(|v| v.as_i64())
    } else {
        None
    };

    let table_description = rows
        .first()
        .and_then(|r| r.get(TABLE_DESCRIPTION_COLUMN))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let empty_columns: Vec<String> = rows
        .first()
        .map(|first| {
            first
                .keys()
                .filter(|k| rows.iter().all(|r| r.get(*k).is_none_or(|v| v.is_null())))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let data = rows
        .into_iter()
        .map(|mut row| {
            for col in INTERNAL_COLUMNS {
                row.shift_remove(*col);
            }
            for col in &empty_columns {
                row.shift_remove(col);
            }
            row
        })
        .collect();

    QueryResponse {
        data,
        table_description,
        next_cursor,
    }
}

/// Run a page request on a held connection
fn select_page(
    conn: &duckdb::Connection,
    schema: &CollectionSchema,
    request: &ReadRequest,
) -> DatabaseResult<QueryResponse> {
    if request.limit == 0 {
        return Ok(QueryResponse::empty());
    }

    let (sql, params) = request.to_sql(schema);
    tracing::debug!(collection = %schema.name, sql = %sql, "reading page");

    let (_, rows) = query_rows(conn, &sql, &params)?;
    Ok(shape_page(rows, request.limit))
}

/// Load a staged table's metadata rows on a held connection
fn select_metadata(
    conn: &duckdb::Connection,
    collection: &str,
    table_name: &str,
) -> DatabaseResult<Vec<ColumnMetadata>> {
    let mut stmt = conn
        .prepare(metadata_sql::SELECT_TABLE)
        .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map([collection, table_name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DatabaseError::QueryFailed(format!("Bad metadata row: {}", e)))?;

    rows.into_iter()
        .map(
            |(data_collection, table_name, column_name, n_non_null, n_unique, dtype)|
             -> DatabaseResult<ColumnMetadata> {
                let dtype = dtype.parse::<SqlType>().map_err(DatabaseError::QueryFailed)?;
                Ok(ColumnMetadata {
                    data_collection,
                    table_name,
                    column_name,
                    n_non_null,
                    n_unique,
                    dtype,
                })
            },
        )
        .collect()
}

impl DuckDBBackend {
    /// Read one page of a production relation
    pub fn read_page(
        &self,
        schema: &CollectionSchema,
        request: &ReadRequest,
    ) -> DatabaseResult<QueryResponse> {
        let conn = self.lock()?;
        select_page(&conn, schema, request)
    }

    /// Plan and read a page against one staged snapshot.
    ///
    /// `plan` receives the table's metadata and builds the page request; both
    /// reads happen under the same connection lock, so a concurrent staging
    /// run cannot swap the relation between them. `plan` must not call back
    /// into the backend.
    pub fn read_snapshot<E, F>(
        &self,
        schema: &CollectionSchema,
        table_name: &str,
        plan: F,
    ) -> Result<QueryResponse, E>
    where
        E: From<DatabaseError>,
        F: FnOnce(&[ColumnMetadata]) -> Result<ReadRequest, E>,
    {
        let conn = self.lock()?;
        let metadata = select_metadata(&conn, &schema.name, table_name)?;
        let request = plan(&metadata)?;
        Ok(select_page(&conn, schema, &request)?)
    }

    /// Queryable columns of a staged table, in schema order
    pub fn table_metadata(
        &self,
        collection: &str,
        table_name: &str,
    ) -> DatabaseResult<Vec<ColumnMetadata>> {
        let conn = self.lock()?;
        select_metadata(&conn, collection, table_name)
    }

    /// Tables currently in production with their ingest version and size
    pub fn staged_summary(
        &self,
        schema: &CollectionSchema,
        table_name: Option<&str>,
    ) -> DatabaseResult<Vec<StagedTableSummary>> {
        let table_col = quote_identifier(TABLE_NAME_COLUMN);
        let year = schema
            .contains(YEAR_COLUMN)
            .then(|| quote_identifier(YEAR_COLUMN));

        let mut sql = format!(
            "SELECT {table_col} AS table_name, MAX({id}) AS ingest_id, MAX({ts}) AS ingest_ts, COUNT(*) AS row_count",
            id = quote_identifier(INGEST_ID_COLUMN),
            ts = quote_identifier(INGEST_TS_COLUMN),
        );
        if let Some(year) = &year {
            sql.push_str(&format!(", MIN({year}) AS min_year, MAX({year}) AS max_year"));
        }
        sql.push_str(&format!(" FROM {}", quote_identifier(&schema.prod_relation())));

        let mut params = Vec::new();
        if let Some(table) = table_name {
            sql.push_str(&format!(" WHERE {table_col} = ?"));
            params.push(Value::Text(table.to_string()));
        }
        sql.push_str(&format!(" GROUP BY {table_col} ORDER BY {table_col}"));

        let conn = self.lock()?;
        let (_, rows) = query_rows(&conn, &sql, &params)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let text = |key: &str| {
                    row.get(key)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                };
                let int = |key: &str| row.get(key).and_then(|v| v.as_i64()).unwrap_or_default();
                let year_bound = |key: &str| row.get(key).filter(|v| !v.is_null()).cloned();

                StagedTableSummary {
                    table_name: text("table_name"),
                    ingest_id: int("ingest_id"),
                    ingest_ts: text("ingest_ts"),
                    row_count: int("row_count"),
                    min_year: year_bound("min_year"),
                    max_year: year_bound("max_year"),
                }
            })
            .collect())
    }
}
