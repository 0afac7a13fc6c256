//! Domain models
//!
//! Collection schemas, transformed and typed row sets, and the records the
//! store hands back (ingest log rows, column metadata, query pages).

pub mod column;
pub mod dataset;
pub mod enums;
pub mod records;

pub use column::{
    CollectionSchema, ColumnDef, INGEST_ID_COLUMN, INGEST_TS_COLUMN, INTERNAL_COLUMNS,
    ROW_ID_COLUMN, TABLE_DESCRIPTION_COLUMN, TABLE_NAME_COLUMN, is_internal_column,
};
pub use dataset::{Dataset, SqlValue, TypedDataset};
pub use enums::SqlType;
pub use records::{
    ColumnMetadata, INGEST_TS_FORMAT, IngestRecord, QueryResponse, StagedTableSummary,
    end_of_day, format_ingest_ts,
};
