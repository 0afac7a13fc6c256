//! Database schema definitions
//!
//! Fixed relations (`_ingest_log`, `_metadata`, `_table_catalog`,
//! `schema_version`) are plain DDL. Per-collection relations are generated
//! from the collection schema; their names and column identifiers have been
//! validated at config load and are quoted here.

use crate::models::{
    CollectionSchema, INGEST_ID_COLUMN, INGEST_TS_COLUMN, ROW_ID_COLUMN,
    TABLE_DESCRIPTION_COLUMN,
};
use crate::validation::input::quote_identifier;

/// Schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Database schema helper
pub struct StoreSchema;

impl StoreSchema {
    /// Get the fixed schema creation SQL
    pub fn create_tables_sql() -> &'static str {
        r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- One row per ingest attempt; success flips once the batch is written
CREATE SEQUENCE IF NOT EXISTS ingest_id_seq START 1;

CREATE TABLE IF NOT EXISTS _ingest_log (
    ingest_id BIGINT NOT NULL DEFAULT nextval('ingest_id_seq'),
    ingest_ts VARCHAR NOT NULL,
    data_collection VARCHAR NOT NULL,
    table_name VARCHAR NOT NULL,
    url VARCHAR NOT NULL DEFAULT '',
    success BOOLEAN NOT NULL DEFAULT FALSE
);

-- Queryable columns of each staged table, rebuilt by every staging run
CREATE TABLE IF NOT EXISTS _metadata (
    data_collection VARCHAR NOT NULL,
    table_name VARCHAR NOT NULL,
    column_name VARCHAR NOT NULL,
    ordinal INTEGER NOT NULL,
    n_non_null BIGINT NOT NULL,
    n_unique BIGINT NOT NULL,
    dtype VARCHAR NOT NULL
);

-- Table descriptions from configuration, joined into production rows
CREATE TABLE IF NOT EXISTS _table_catalog (
    data_collection VARCHAR NOT NULL,
    table_name VARCHAR NOT NULL,
    table_description VARCHAR
);
"#
    }

    /// Name of the row id sequence of a collection's raw relation
    pub fn row_id_sequence(schema: &CollectionSchema) -> String {
        format!("{}_row_id_seq", schema.raw_relation())
    }

    /// Raw relation DDL: append-only rows tagged with their ingest id
    pub fn create_raw_sql(schema: &CollectionSchema) -> String {
        let sequence = Self::row_id_sequence(schema);
        let mut columns = vec![
            format!(
                "{} BIGINT NOT NULL DEFAULT nextval('{}')",
                quote_identifier(ROW_ID_COLUMN),
                sequence
            ),
            format!("{} BIGINT NOT NULL", quote_identifier(INGEST_ID_COLUMN)),
        ];
        columns.extend(schema.columns.iter().map(|c| {
            format!("{} {}", quote_identifier(&c.name), c.sql_type.ddl_type())
        }));

        format!(
            "CREATE SEQUENCE IF NOT EXISTS {} START 1;\nCREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
            quote_identifier(&sequence),
            quote_identifier(&schema.raw_relation()),
            columns.join(",\n    ")
        )
    }

    /// Columns added to the collection after its raw relation was created
    pub fn add_raw_columns_sql(schema: &CollectionSchema) -> String {
        let raw = quote_identifier(&schema.raw_relation());
        schema
            .columns
            .iter()
            .map(|c| {
                format!(
                    "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {};",
                    raw,
                    quote_identifier(&c.name),
                    c.sql_type.ddl_type()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Production relation columns, in storage order
    pub fn prod_columns(schema: &CollectionSchema) -> Vec<(String, &'static str)> {
        let mut columns = vec![
            (ROW_ID_COLUMN.to_string(), "BIGINT"),
            (INGEST_ID_COLUMN.to_string(), "BIGINT"),
            (INGEST_TS_COLUMN.to_string(), "VARCHAR"),
            (TABLE_DESCRIPTION_COLUMN.to_string(), "VARCHAR"),
        ];
        columns.extend(
            schema
                .columns
                .iter()
                .map(|c| (c.name.clone(), c.sql_type.ddl_type())),
        );
        columns
    }

    /// Production relation DDL
    pub fn create_prod_sql(schema: &CollectionSchema, if_not_exists: bool) -> String {
        let columns: Vec<String> = Self::prod_columns(schema)
            .iter()
            .map(|(name, ty)| format!("{} {}", quote_identifier(name), ty))
            .collect();

        format!(
            "CREATE TABLE {}{} (\n    {}\n);",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_identifier(&schema.prod_relation()),
            columns.join(",\n    ")
        )
    }

    /// Fill the production relation with the latest successful slice of each
    /// table at or before the cutoff.
    ///
    /// Binds: collection, cutoff, collection. Ties on `ingest_ts` go to the
    /// highest `ingest_id`.
    pub fn populate_prod_sql(schema: &CollectionSchema) -> String {
        let data_columns: Vec<String> = schema
            .columns
            .iter()
            .map(|c| format!("src.{}", quote_identifier(&c.name)))
            .collect();

        format!(
            r#"INSERT INTO {prod}
SELECT
    src.{row_id},
    src.{ingest_id},
    latest.ingest_ts,
    cat.table_description,
    {data_columns}
FROM {raw} AS src
JOIN (
    SELECT
        ingest_id,
        ingest_ts,
        ROW_NUMBER() OVER (
            PARTITION BY table_name
            ORDER BY ingest_ts DESC, ingest_id DESC
        ) AS version_rank
    FROM _ingest_log
    WHERE data_collection = ?
        AND success
        AND ingest_ts <= ?
) AS latest
    ON src.{ingest_id} = latest.ingest_id
    AND latest.version_rank = 1
LEFT JOIN _table_catalog AS cat
    ON cat.data_collection = ?
    AND cat.table_name = src."table_name"
ORDER BY src.{row_id}"#,
            prod = quote_identifier(&schema.prod_relation()),
            raw = quote_identifier(&schema.raw_relation()),
            row_id = quote_identifier(ROW_ID_COLUMN),
            ingest_id = quote_identifier(INGEST_ID_COLUMN),
            data_columns = data_columns.join(",\n    "),
        )
    }

    /// Insert statement for one raw row with the given data columns
    pub fn insert_raw_sql(schema: &CollectionSchema, columns: &[String]) -> String {
        let mut names = vec![quote_identifier(INGEST_ID_COLUMN)];
        names.extend(columns.iter().map(|c| quote_identifier(c)));
        let placeholders = vec!["?"; names.len()].join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&schema.raw_relation()),
            names.join(", "),
            placeholders
        )
    }
}

/// SQL for ingest log operations
pub mod ingest_log_sql {
    pub const INSERT: &str = r#"
INSERT INTO _ingest_log (ingest_ts, data_collection, table_name, url, success)
VALUES (?, ?, ?, ?, FALSE)
RETURNING ingest_id
"#;

    pub const MARK_SUCCESS: &str = "UPDATE _ingest_log SET success = TRUE WHERE ingest_id = ?";

    pub const SELECT_BY_ID: &str = r#"
SELECT ingest_id, ingest_ts, data_collection, table_name, url, success
FROM _ingest_log
WHERE ingest_id = ?
"#;

    pub const SELECT_VERSIONS: &str = r#"
SELECT ingest_id, ingest_ts, data_collection, table_name, url, success
FROM _ingest_log
WHERE data_collection = ?
    AND success
ORDER BY table_name, ingest_ts DESC, ingest_id DESC
"#;

    pub const SELECT_TABLE_VERSIONS: &str = r#"
SELECT ingest_id, ingest_ts, data_collection, table_name, url, success
FROM _ingest_log
WHERE data_collection = ?
    AND table_name = ?
    AND success
ORDER BY ingest_ts DESC, ingest_id DESC
"#;
}

/// SQL for metadata and catalog operations
pub mod metadata_sql {
    pub const DELETE_COLLECTION: &str = "DELETE FROM _metadata WHERE data_collection = ?";

    pub const SELECT_TABLE: &str = r#"
SELECT data_collection, table_name, column_name, n_non_null, n_unique, dtype
FROM _metadata
WHERE data_collection = ?
    AND table_name = ?
ORDER BY ordinal
"#;

    pub const DELETE_CATALOG: &str = "DELETE FROM _table_catalog WHERE data_collection = ?";

    pub const INSERT_CATALOG: &str = r#"
INSERT INTO _table_catalog (data_collection, table_name, table_description)
VALUES (?, ?, ?)
"#;
}
