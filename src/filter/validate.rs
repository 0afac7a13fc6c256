//! Column and operator validation with literal casting
//!
//! Columns are checked for the whole expression first, then operators and
//! literals. Validation builds a new [`TypedFilter`]; the parsed input is
//! never modified, so a rejected group leaves nothing half-applied.

use std::collections::HashSet;

use serde_json::Value;

use super::FilterError;
use super::ast::{Condition, Operator, RawFilter, TypedFilter};
use crate::models::{CollectionSchema, ColumnMetadata, SqlType, SqlValue, TABLE_NAME_COLUMN};
use crate::validation::schema::{cast_integer, cast_real};

/// Validate a parsed filter for one staged table
///
/// `metadata` lists the queryable columns of the table.
pub fn validate_filter(
    schema: &CollectionSchema,
    table_name: &str,
    metadata: &[ColumnMetadata],
    filter: &RawFilter,
) -> Result<TypedFilter, FilterError> {
    let queryable: HashSet<&str> = metadata.iter().map(|m| m.column_name.as_str()).collect();

    for condition in filter.conditions() {
        check_column(schema, table_name, &queryable, &condition.column)?;
    }

    filter.try_map(&mut |condition| {
        let sql_type = schema
            .column(&condition.column)
            .map(|c| c.sql_type)
            .ok_or_else(|| FilterError::UnknownColumn {
                collection: schema.name.clone(),
                column: condition.column.clone(),
            })?;
        cast_literal(sql_type, condition)
    })
}

fn check_column(
    schema: &CollectionSchema,
    table_name: &str,
    queryable: &HashSet<&str>,
    column: &str,
) -> Result<(), FilterError> {
    if column == TABLE_NAME_COLUMN {
        return Err(FilterError::ReservedColumn(column.to_string()));
    }
    if !schema.contains(column) {
        return Err(FilterError::UnknownColumn {
            collection: schema.name.clone(),
            column: column.to_string(),
        });
    }
    if !queryable.contains(column) {
        return Err(FilterError::NotQueryable {
            collection: schema.name.clone(),
            table_name: table_name.to_string(),
            column: column.to_string(),
        });
    }
    Ok(())
}

/// Check the operator against the column type and cast the literal
fn cast_literal(sql_type: SqlType, condition: &Condition<Value>) -> Result<SqlValue, FilterError> {
    let Condition {
        column,
        operator,
        literal,
    } = condition;

    if !Operator::allowed_for(sql_type).contains(operator) {
        return Err(FilterError::DisallowedOperator {
            column: column.clone(),
            operator: operator.name().to_string(),
        });
    }

    let cast = match (sql_type, operator, literal) {
        (SqlType::Integer, _, Value::Number(_) | Value::String(_)) => cast_integer(literal),
        (SqlType::Real, _, Value::Number(_) | Value::String(_)) => cast_real(literal),
        (SqlType::Text, Operator::Like, Value::String(s)) => SqlValue::Text(s.clone()),
        (SqlType::Text, Operator::Like, _) => SqlValue::Null,
        (SqlType::Text, _, Value::String(s)) => SqlValue::Text(s.clone()),
        (SqlType::Text, _, Value::Number(_) | Value::Bool(_)) => {
            SqlValue::Text(literal.to_string())
        }
        _ => SqlValue::Null,
    };

    if cast.is_null() {
        return Err(FilterError::UncastableLiteral {
            column: column.clone(),
            operator: operator.name().to_string(),
            sql_type,
            literal: literal.to_string(),
        });
    }
    Ok(cast)
}
