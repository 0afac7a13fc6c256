//! QUEENS - versioned ingestion and as-of staging for published statistics
//!
//! Provides:
//! - An append-only ingest log with per-table raw batches
//! - As-of staging of a consistent production snapshot per collection,
//!   with per-table column metadata
//! - A filter compiler turning JSON filters into parameterised SQL
//! - Cursor-paginated reads over the production snapshot
//!
//! Every table of a collection shares the collection's column schema.

pub mod config;
pub mod database;
pub mod error;
pub mod filter;
pub mod models;
pub mod service;
pub mod transform;
pub mod validation;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{ConfigError, ServiceConfig, TableConfig};
pub use database::{DatabaseError, DuckDBBackend, StageReport};
pub use error::{ErrorClass, ServiceError, ServiceResult};
pub use filter::{CompiledFilter, FilterError};
pub use models::{
    CollectionSchema, ColumnDef, ColumnMetadata, Dataset, IngestRecord, QueryResponse, SqlType,
    SqlValue, StagedTableSummary,
};
pub use service::{IngestReport, StatsService};
pub use transform::{TransformContext, TransformError, TransformRegistry};
pub use validation::{SchemaError, ValidationError};
