//! Records read back from the store and returned to callers

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::enums::SqlType;

/// Storage format of `ingest_ts`; fixed width so text order is time order
pub const INGEST_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Format a timestamp the way the ingest log stores it
pub fn format_ingest_ts(ts: NaiveDateTime) -> String {
    ts.format(INGEST_TS_FORMAT).to_string()
}

/// Staging cutoff covering the whole of `date`
pub fn end_of_day(date: NaiveDate) -> NaiveDateTime {
    let last = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN);
    date.and_time(last)
}

/// One ingest attempt as recorded in the ingest log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRecord {
    pub ingest_id: i64,
    pub ingest_ts: String,
    pub data_collection: String,
    pub table_name: String,
    pub url: String,
    pub success: bool,
}

/// Per-column statistics of one staged table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub data_collection: String,
    pub table_name: String,
    pub column_name: String,
    pub n_non_null: i64,
    pub n_unique: i64,
    pub dtype: SqlType,
}

/// Summary of a table slice currently in production
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedTableSummary {
    pub table_name: String,
    pub ingest_id: i64,
    pub ingest_ts: String,
    pub row_count: i64,
    /// Range of the `year` column, when the collection declares one
    pub min_year: Option<Value>,
    pub max_year: Option<Value>,
}

/// One page of query results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: Vec<Map<String, Value>>,
    pub table_description: Option<String>,
    pub next_cursor: Option<i64>,
}

impl QueryResponse {
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            table_description: None,
            next_cursor: None,
        }
    }
}
