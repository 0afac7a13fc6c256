//! Schema validation and casting of transformed datasets
//!
//! Turns a [`Dataset`] produced by a transform into a [`TypedDataset`] whose
//! columns all belong to the collection schema and whose values carry the
//! declared SQL types. Source tables use suppression markers (`[x]`, `..`,
//! `-`) in numeric cells; those become nulls rather than errors, but a REAL
//! column where nothing parses is rejected as a broken transform.

use std::borrow::Cow;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    CollectionSchema, Dataset, SqlType, SqlValue, TABLE_NAME_COLUMN, TypedDataset,
};

static RE_GROUPED_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").expect("Invalid regex")
});

/// Errors raised when a dataset violates its collection schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Duplicate index {index} in table {table_name} of collection {collection}")]
    DuplicateIndex {
        collection: String,
        table_name: String,
        index: String,
    },

    #[error("Unexpected column not in schema for {collection} {table_name}: {column}")]
    UnexpectedColumn {
        collection: String,
        table_name: String,
        column: String,
    },

    #[error("Column {column} of {collection} {table_name} has no value parsable as {sql_type}")]
    Unparsable {
        collection: String,
        table_name: String,
        column: String,
        sql_type: SqlType,
    },

    #[error("Column {column} of {collection} {table_name} is not nullable but {count} null value(s) were found")]
    IllegalNull {
        collection: String,
        table_name: String,
        column: String,
        count: usize,
    },
}

/// Parse a numeric token, accepting `1,234.5` style grouping
fn parse_number_token(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned: Cow<'_, str> = if RE_GROUPED_NUMBER.is_match(trimmed) {
        Cow::Owned(trimmed.replace(',', ""))
    } else {
        Cow::Borrowed(trimmed)
    };

    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn integral(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Coerce to a float; anything unparsable becomes null
pub fn cast_real(value: &Value) -> SqlValue {
    let parsed = match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_number_token(s),
        _ => None,
    };
    parsed.map_or(SqlValue::Null, SqlValue::Real)
}

/// Coerce to an integer; fractional or unparsable values become null
pub fn cast_integer(value: &Value) -> SqlValue {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| parse_number_token(s).and_then(integral)),
        _ => None,
    };
    parsed.map_or(SqlValue::Null, SqlValue::Integer)
}

/// Stringify any non-null value
pub fn cast_text(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Pass datetime values through without interpretation
pub fn cast_datetime(value: &Value) -> SqlValue {
    cast_text(value)
}

/// Cast a raw value to a declared column type
pub fn cast_value(sql_type: SqlType, value: &Value) -> SqlValue {
    match sql_type {
        SqlType::Real => cast_real(value),
        SqlType::Integer => cast_integer(value),
        SqlType::Text => cast_text(value),
        SqlType::Datetime => cast_datetime(value),
    }
}

/// Validate a transformed dataset against the collection schema and cast it.
///
/// The index columns are kept as regular columns and `table_name` is stamped
/// on every row. Pure: nothing is logged or written.
pub fn validate_dataset(
    schema: &CollectionSchema,
    table_name: &str,
    dataset: &Dataset,
) -> Result<TypedDataset, SchemaError> {
    let collection = schema.name.as_str();

    if !dataset.index.is_empty() {
        let mut seen = HashSet::with_capacity(dataset.len());
        for record in &dataset.records {
            let key = Value::Array(dataset.index_key(record)).to_string();
            if !seen.insert(key.clone()) {
                return Err(SchemaError::DuplicateIndex {
                    collection: collection.to_string(),
                    table_name: table_name.to_string(),
                    index: key,
                });
            }
        }
    }

    // An empty dataset carries no values for the collection's REAL columns
    if dataset.is_empty()
        && let Some(def) = schema.columns.iter().find(|c| c.sql_type == SqlType::Real)
    {
        return Err(SchemaError::Unparsable {
            collection: collection.to_string(),
            table_name: table_name.to_string(),
            column: def.name.clone(),
            sql_type: def.sql_type,
        });
    }

    let mut columns = dataset.columns();
    if !columns.iter().any(|c| c == TABLE_NAME_COLUMN) {
        columns.push(TABLE_NAME_COLUMN.to_string());
    }

    let mut cast_columns: Vec<Vec<SqlValue>> = Vec::with_capacity(columns.len());

    for column in &columns {
        let Some(def) = schema.column(column) else {
            return Err(SchemaError::UnexpectedColumn {
                collection: collection.to_string(),
                table_name: table_name.to_string(),
                column: column.clone(),
            });
        };

        let values: Vec<SqlValue> = if column == TABLE_NAME_COLUMN {
            vec![SqlValue::Text(table_name.to_string()); dataset.len()]
        } else {
            dataset
                .records
                .iter()
                .map(|r| cast_value(def.sql_type, r.get(column).unwrap_or(&Value::Null)))
                .collect()
        };

        let nulls = values.iter().filter(|v| v.is_null()).count();

        if def.sql_type == SqlType::Real && nulls == values.len() {
            return Err(SchemaError::Unparsable {
                collection: collection.to_string(),
                table_name: table_name.to_string(),
                column: column.clone(),
                sql_type: def.sql_type,
            });
        }

        if !def.nullable && nulls > 0 {
            return Err(SchemaError::IllegalNull {
                collection: collection.to_string(),
                table_name: table_name.to_string(),
                column: column.clone(),
                count: nulls,
            });
        }

        cast_columns.push(values);
    }

    let rows = (0..dataset.len())
        .map(|i| cast_columns.iter().map(|col| col[i].clone()).collect())
        .collect();

    Ok(TypedDataset {
        table_name: table_name.to_string(),
        columns,
        rows,
    })
}
