//! Row sets produced by transforms and consumed by the ingest path

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A transformed, not yet validated row set
///
/// Records are JSON objects keyed by column name. The `index` names the
/// columns that identify a row; they are ordinary record fields and end up as
/// columns of the raw relation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub index: Vec<String>,
    #[serde(default)]
    pub records: Vec<Map<String, Value>>,
}

impl Dataset {
    pub fn from_records(index: Vec<String>, records: Vec<Map<String, Value>>) -> Self {
        Self { index, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names in first-seen order across all records
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.index.clone();
        for record in &self.records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }

    /// The index tuple of a record; missing index fields read as null
    pub fn index_key(&self, record: &Map<String, Value>) -> Vec<Value> {
        self.index
            .iter()
            .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

/// A value after casting to its declared column type
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::from(*i),
            SqlValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<SqlValue> for duckdb::types::Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => duckdb::types::Value::Null,
            SqlValue::Integer(i) => duckdb::types::Value::BigInt(i),
            SqlValue::Real(f) => duckdb::types::Value::Double(f),
            SqlValue::Text(s) => duckdb::types::Value::Text(s),
        }
    }
}

/// A validated row set whose values match the collection schema
#[derive(Debug, Clone, PartialEq)]
pub struct TypedDataset {
    pub table_name: String,
    /// Column names, aligned with every row
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl TypedDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of a single column, in row order
    pub fn column_values(&self, name: &str) -> Option<Vec<&SqlValue>> {
        let pos = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[pos]).collect())
    }
}
