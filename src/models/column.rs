//! Column definitions and the per-collection schema

use serde::{Deserialize, Serialize};

use super::enums::SqlType;

/// Column every row carries: the logical table the row belongs to
pub const TABLE_NAME_COLUMN: &str = "table_name";

/// Monotonic row identifier, used as the pagination key
pub const ROW_ID_COLUMN: &str = "row_id";

/// Ingest log reference stamped on every raw row
pub const INGEST_ID_COLUMN: &str = "ingest_id";

/// Ingest timestamp joined into production rows
pub const INGEST_TS_COLUMN: &str = "ingest_ts";

/// Table description joined into production rows from the catalog
pub const TABLE_DESCRIPTION_COLUMN: &str = "table_description";

/// Bookkeeping columns stripped from query results
pub const INTERNAL_COLUMNS: &[&str] = &[
    ROW_ID_COLUMN,
    INGEST_ID_COLUMN,
    INGEST_TS_COLUMN,
    TABLE_DESCRIPTION_COLUMN,
];

/// Check whether a column name is reserved for bookkeeping
pub fn is_internal_column(name: &str) -> bool {
    INTERNAL_COLUMNS.contains(&name)
}

fn default_nullable() -> bool {
    true
}

/// A statically declared collection column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: SqlType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, sql_type: SqlType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable,
        }
    }
}

/// The immutable column schema shared by every table of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Collection name, also the prefix of its raw and production relations
    pub name: String,
    /// Columns in declaration order; always includes `table_name`
    pub columns: Vec<ColumnDef>,
}

impl CollectionSchema {
    /// Build a schema, adding the implicit `table_name` column when absent
    pub fn new(name: impl Into<String>, mut columns: Vec<ColumnDef>) -> Self {
        if !columns.iter().any(|c| c.name == TABLE_NAME_COLUMN) {
            columns.insert(0, ColumnDef::new(TABLE_NAME_COLUMN, SqlType::Text, false));
        }
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Name of the raw (append-only) relation
    pub fn raw_relation(&self) -> String {
        format!("{}_raw", self.name)
    }

    /// Name of the production relation
    pub fn prod_relation(&self) -> String {
        format!("{}_prod", self.name)
    }
}
