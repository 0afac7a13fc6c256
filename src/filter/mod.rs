//! Filter query compiler
//!
//! Turns an untrusted JSON filter into a parameterised predicate over a
//! collection's production relation:
//! - `parse`: JSON to a [`RawFilter`] tree
//! - `validate`: column, operator and literal checks against the schema and
//!   the table's queryable columns, producing a [`TypedFilter`]
//! - `compile`: the WHERE text and its ordered parameters
//!
//! Nothing here touches the store.

pub mod ast;
pub mod compile;
pub mod parse;
pub mod validate;

pub use ast::{Condition, FilterExpr, Operator, RawFilter, TypedFilter};
pub use compile::{CompiledFilter, compile};
pub use parse::{OR_KEY, parse_filter_value, parse_filters};
pub use validate::validate_filter;

use thiserror::Error;

use crate::models::{CollectionSchema, ColumnMetadata, SqlType};

/// Errors raised while parsing or validating a filter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Not JSON, or not a filter shape
    #[error("Malformed filter: {0}")]
    Malformed(String),

    #[error("Unknown column for collection {collection}: {column}")]
    UnknownColumn { collection: String, column: String },

    #[error("Column {column} is not queryable for {collection} table {table_name}")]
    NotQueryable {
        collection: String,
        table_name: String,
        column: String,
    },

    /// The table scope is applied by the query itself
    #[error("Column {0} cannot be filtered on")]
    ReservedColumn(String),

    #[error("Operator {operator} is not allowed on column {column}")]
    DisallowedOperator { column: String, operator: String },

    #[error("Value {literal} for {column} {operator} cannot be used as {sql_type}")]
    UncastableLiteral {
        column: String,
        operator: String,
        sql_type: SqlType,
        literal: String,
    },
}

impl FilterError {
    /// Whether the request could not be read as a filter at all
    pub fn is_malformed(&self) -> bool {
        matches!(self, FilterError::Malformed(_))
    }
}

/// Parse, validate and compile filter JSON for one table
pub fn build_filter(
    schema: &CollectionSchema,
    table_name: &str,
    metadata: &[ColumnMetadata],
    filters: Option<&str>,
) -> Result<CompiledFilter, FilterError> {
    let parsed = parse_filters(filters.unwrap_or_default())?;
    let typed = validate_filter(schema, table_name, metadata, &parsed)?;
    Ok(compile(table_name, &typed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnDef, SqlValue};

    fn schema() -> CollectionSchema {
        CollectionSchema::new(
            "dukes",
            vec![
                ColumnDef::new("year", SqlType::Integer, false),
                ColumnDef::new("fuel", SqlType::Text, true),
            ],
        )
    }

    fn metadata() -> Vec<ColumnMetadata> {
        schema()
            .columns
            .iter()
            .map(|c| ColumnMetadata {
                data_collection: "dukes".to_string(),
                table_name: "1.1".to_string(),
                column_name: c.name.clone(),
                n_non_null: 10,
                n_unique: 3,
                dtype: c.sql_type,
            })
            .collect()
    }

    #[test]
    fn test_range_and_like() {
        let compiled = build_filter(
            &schema(),
            "1.1",
            &metadata(),
            Some(r#"{"year": {"gte": 2010, "lt": 2021}, "fuel": {"like": "%gas%"}}"#),
        )
        .unwrap();

        assert_eq!(
            compiled.where_sql,
            "\"table_name\" = ? AND \"year\" >= ? AND \"year\" < ? AND \"fuel\" LIKE ?"
        );
        assert_eq!(
            compiled.params[1..],
            [
                SqlValue::Integer(2010),
                SqlValue::Integer(2021),
                SqlValue::Text("%gas%".to_string())
            ]
        );
        assert_eq!(compiled.placeholder_count(), compiled.params.len());
    }

    #[test]
    fn test_or_groups() {
        let compiled = build_filter(
            &schema(),
            "1.1",
            &metadata(),
            Some(r#"{"$or": [{"fuel": "Gas"}, {"fuel": "Coal"}], "year": {"gt": 2020}}"#),
        )
        .unwrap();

        assert_eq!(
            compiled.where_sql,
            "\"table_name\" = ? AND \"year\" > ? AND (\"fuel\" = ? OR \"fuel\" = ?)"
        );
        assert_eq!(
            compiled.params,
            vec![
                SqlValue::Text("1.1".to_string()),
                SqlValue::Integer(2020),
                SqlValue::Text("Gas".to_string()),
                SqlValue::Text("Coal".to_string()),
            ]
        );
    }

    #[test]
    fn test_no_filters() {
        let compiled = build_filter(&schema(), "1.1", &metadata(), None).unwrap();
        assert_eq!(compiled.params.len(), 1);
    }

    #[test]
    fn test_malformed_is_distinguished() {
        let err = build_filter(&schema(), "1.1", &metadata(), Some("{")).unwrap_err();
        assert!(err.is_malformed());
        let err = build_filter(&schema(), "1.1", &metadata(), Some(r#"{"x": 1}"#)).unwrap_err();
        assert!(!err.is_malformed());
    }
}
