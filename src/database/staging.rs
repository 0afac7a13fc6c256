//! As-of staging of production relations
//!
//! A staging run rebuilds `{collection}_prod` from the latest successful
//! slice of every table at or before the cutoff, then regenerates the
//! collection's `_metadata` and `_table_catalog` rows. Everything happens in
//! one transaction: readers see the previous production state until commit,
//! and a failure leaves it untouched.

use duckdb::types::Value;
use serde::{Deserialize, Serialize};

use super::duckdb::DuckDBBackend;
use super::schema::{StoreSchema, metadata_sql};
use super::{DatabaseError, DatabaseResult};
use crate::models::{CollectionSchema, TABLE_NAME_COLUMN, is_internal_column};
use crate::validation::input::quote_identifier;

/// Outcome of a staging run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub collection: String,
    /// Cutoff timestamp, in ingest log format
    pub cutoff: String,
    /// Tables present in production after the run
    pub tables: usize,
    /// Rows present in production after the run
    pub rows: i64,
}

fn staging_err(step: &str) -> impl Fn(duckdb::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::StagingFailed(format!("{}: {}", step, e))
}

impl DuckDBBackend {
    /// Rebuild a collection's production relation as of `cutoff`
    ///
    /// `descriptions` lists every configured table key with its description;
    /// they replace the collection's catalog rows.
    pub fn stage(
        &self,
        schema: &CollectionSchema,
        descriptions: &[(String, Option<String>)],
        cutoff: &str,
    ) -> DatabaseResult<StageReport> {
        let collection = schema.name.as_str();
        let prod = quote_identifier(&schema.prod_relation());

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(format!("Failed to begin: {}", e)))?;

        tx.execute(metadata_sql::DELETE_CATALOG, [collection])
            .map_err(staging_err("Failed to clear catalog"))?;
        {
            let mut insert = tx
                .prepare(metadata_sql::INSERT_CATALOG)
                .map_err(staging_err("Failed to prepare catalog insert"))?;
            for (table_name, description) in descriptions {
                let description = match description {
                    Some(d) => Value::Text(d.clone()),
                    None => Value::Null,
                };
                insert
                    .execute(duckdb::params_from_iter([
                        Value::Text(collection.to_string()),
                        Value::Text(table_name.clone()),
                        description,
                    ]))
                    .map_err(staging_err("Failed to write catalog"))?;
            }
        }

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {};\n{}",
            prod,
            StoreSchema::create_prod_sql(schema, false)
        ))
        .map_err(staging_err("Failed to recreate production relation"))?;

        tx.execute(
            &StoreSchema::populate_prod_sql(schema),
            duckdb::params![collection, cutoff, collection],
        )
        .map_err(staging_err("Failed to populate production relation"))?;

        tx.execute(metadata_sql::DELETE_COLLECTION, [collection])
            .map_err(staging_err("Failed to clear metadata"))?;

        let table_col = quote_identifier(TABLE_NAME_COLUMN);
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO _metadata \
                     (data_collection, table_name, column_name, ordinal, n_non_null, n_unique, dtype) \
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .map_err(staging_err("Failed to prepare metadata insert"))?;

            for (ordinal, column) in schema.columns.iter().enumerate() {
                if is_internal_column(&column.name) {
                    continue;
                }
                let col = quote_identifier(&column.name);
                let sql = format!(
                    "SELECT {table_col}, COUNT({col}), COUNT(DISTINCT {col}) \
                     FROM {prod} GROUP BY {table_col} HAVING COUNT({col}) > 0"
                );

                let stats: Vec<(String, i64, i64)> = {
                    let mut stmt = tx
                        .prepare(&sql)
                        .map_err(staging_err("Failed to prepare column statistics"))?;
                    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
                        .map_err(staging_err("Failed to compute column statistics"))?
                        .collect::<Result<_, _>>()
                        .map_err(staging_err("Failed to read column statistics"))?
                };

                for (table_name, n_non_null, n_unique) in stats {
                    insert
                        .execute(duckdb::params_from_iter([
                            Value::Text(collection.to_string()),
                            Value::Text(table_name),
                            Value::Text(column.name.clone()),
                            Value::Int(ordinal as i32),
                            Value::BigInt(n_non_null),
                            Value::BigInt(n_unique),
                            Value::Text(column.sql_type.to_string()),
                        ]))
                        .map_err(staging_err("Failed to write metadata"))?;
                }
            }
        }

        let (tables, rows): (i64, i64) = tx
            .query_row(
                &format!("SELECT COUNT(DISTINCT {table_col}), COUNT(*) FROM {prod}"),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(staging_err("Failed to count production rows"))?;

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(format!("Failed to commit: {}", e)))?;

        tracing::info!(collection, cutoff, tables, rows, "staged production relation");

        Ok(StageReport {
            collection: collection.to_string(),
            cutoff: cutoff.to_string(),
            tables: tables as usize,
            rows,
        })
    }
}
