//! Ingestion log and raw batch writes
//!
//! An ingest is written in two phases. The log row is inserted and committed
//! first with `success = false`, so a failed attempt stays visible. The row
//! batch is then appended to the raw relation and the flag flipped inside
//! one transaction. If that transaction fails the batch is rolled back and
//! the log row keeps `success = false` for good.

use duckdb::types::Value;

use super::duckdb::DuckDBBackend;
use super::schema::{StoreSchema, ingest_log_sql};
use super::{DatabaseError, DatabaseResult};
use crate::models::{CollectionSchema, IngestRecord, TypedDataset};

/// Result of a completed two-phase ingest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub ingest_id: i64,
    pub rows_written: usize,
}

fn read_record(row: &duckdb::Row) -> duckdb::Result<IngestRecord> {
    Ok(IngestRecord {
        ingest_id: row.get(0)?,
        ingest_ts: row.get(1)?,
        data_collection: row.get(2)?,
        table_name: row.get(3)?,
        url: row.get(4)?,
        success: row.get(5)?,
    })
}

impl DuckDBBackend {
    /// Pre-register an ingest attempt and return its id
    pub fn append_ingest(
        &self,
        collection: &str,
        table_name: &str,
        url: &str,
        ingest_ts: &str,
    ) -> DatabaseResult<i64> {
        let conn = self.lock()?;
        conn.query_row(
            ingest_log_sql::INSERT,
            duckdb::params![ingest_ts, collection, table_name, url],
            |row| row.get(0),
        )
        .map_err(|e| DatabaseError::WriteFailed(format!("Failed to append ingest log: {}", e)))
    }

    /// Flip the success flag of an ingest attempt
    pub fn mark_success(&self, ingest_id: i64) -> DatabaseResult<()> {
        let conn = self.lock()?;
        let updated = conn
            .execute(ingest_log_sql::MARK_SUCCESS, [ingest_id])
            .map_err(|e| DatabaseError::WriteFailed(format!("Failed to mark success: {}", e)))?;
        if updated == 0 {
            return Err(DatabaseError::WriteFailed(format!(
                "No ingest log entry with id {}",
                ingest_id
            )));
        }
        Ok(())
    }

    /// Append a validated batch tagged with `ingest_id` and mark the attempt
    /// successful, atomically
    pub fn write_batch(
        &self,
        schema: &CollectionSchema,
        ingest_id: i64,
        batch: &TypedDataset,
    ) -> DatabaseResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(format!("Failed to begin: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(&StoreSchema::insert_raw_sql(schema, &batch.columns))
                .map_err(|e| DatabaseError::WriteFailed(format!("Prepare failed: {}", e)))?;

            for row in &batch.rows {
                let params = std::iter::once(Value::BigInt(ingest_id))
                    .chain(row.iter().cloned().map(Value::from));
                stmt.execute(duckdb::params_from_iter(params)).map_err(|e| {
                    DatabaseError::WriteFailed(format!(
                        "Failed to write {} {}: {}",
                        schema.name, batch.table_name, e
                    ))
                })?;
            }
        }

        tx.execute(ingest_log_sql::MARK_SUCCESS, [ingest_id])
            .map_err(|e| DatabaseError::WriteFailed(format!("Failed to mark success: {}", e)))?;

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(format!("Failed to commit: {}", e)))?;

        Ok(batch.len())
    }

    /// Two-phase ingest of one validated table batch
    pub fn ingest_batch(
        &self,
        schema: &CollectionSchema,
        batch: &TypedDataset,
        url: &str,
        ingest_ts: &str,
    ) -> DatabaseResult<IngestOutcome> {
        let ingest_id = self.append_ingest(&schema.name, &batch.table_name, url, ingest_ts)?;

        match self.write_batch(schema, ingest_id, batch) {
            Ok(rows_written) => Ok(IngestOutcome {
                ingest_id,
                rows_written,
            }),
            Err(e) => {
                tracing::warn!(
                    collection = %schema.name,
                    table = %batch.table_name,
                    ingest_id,
                    error = %e,
                    "ingest write failed; log entry left unsuccessful"
                );
                Err(e)
            }
        }
    }

    /// Fetch one ingest log entry
    pub fn ingest_record(&self, ingest_id: i64) -> DatabaseResult<Option<IngestRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(ingest_log_sql::SELECT_BY_ID)
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;
        let mut rows = stmt
            .query([ingest_id])
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

        match rows
            .next()
            .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?
        {
            Some(row) => read_record(row)
                .map(Some)
                .map_err(|e| DatabaseError::QueryFailed(format!("Bad ingest log row: {}", e))),
            None => Ok(None),
        }
    }

    /// Successful ingest versions of a collection, newest first per table
    pub fn ingest_versions(
        &self,
        collection: &str,
        table_name: Option<&str>,
    ) -> DatabaseResult<Vec<IngestRecord>> {
        let conn = self.lock()?;
        let (sql, params): (&str, Vec<Value>) = match table_name {
            Some(table) => (
                ingest_log_sql::SELECT_TABLE_VERSIONS,
                vec![
                    Value::Text(collection.to_string()),
                    Value::Text(table.to_string()),
                ],
            ),
            None => (
                ingest_log_sql::SELECT_VERSIONS,
                vec![Value::Text(collection.to_string())],
            ),
        };

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;
        let records = stmt
            .query_map(duckdb::params_from_iter(params.iter()), read_record)
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DatabaseError::QueryFailed(format!("Bad ingest log row: {}", e)))?;

        Ok(records)
    }
}
