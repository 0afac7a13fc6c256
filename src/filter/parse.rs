//! Filter parsing
//!
//! Accepted shapes:
//! - `{"year": 2020}`: scalar, implicit `eq`
//! - `{"year": {"gte": 2010, "lt": 2021}}`: explicit operators, AND-ed
//! - `{"$or": [{"fuel": "Gas"}, {"fuel": "Coal"}], ...}`: alternative groups
//!
//! `$or` also tolerates the older object form, where every member becomes
//! a single-condition group.

use serde_json::{Map, Value};

use super::FilterError;
use super::ast::{FilterExpr, Operator, RawFilter};

/// Reserved key holding the alternative groups
pub const OR_KEY: &str = "$or";

/// Parse filter JSON text; blank input filters nothing
pub fn parse_filters(input: &str) -> Result<RawFilter, FilterError> {
    if input.trim().is_empty() {
        return Ok(FilterExpr::empty());
    }
    let value: Value = serde_json::from_str(input)
        .map_err(|e| FilterError::Malformed(format!("Invalid filter JSON: {}", e)))?;
    parse_filter_value(&value)
}

/// Parse an already decoded filter object
pub fn parse_filter_value(value: &Value) -> Result<RawFilter, FilterError> {
    let Value::Object(object) = value else {
        return Err(FilterError::Malformed(
            "Filters must be a JSON object".to_string(),
        ));
    };

    let mut base = Map::new();
    let mut or_raw = None;
    for (key, value) in object {
        if key == OR_KEY {
            or_raw = Some(value);
        } else {
            base.insert(key.clone(), value.clone());
        }
    }

    let mut root = parse_group(&base)?;

    if let Some(or_raw) = or_raw {
        let groups = parse_or_groups(or_raw)?;
        if !groups.is_empty() {
            root.push(FilterExpr::Or(groups));
        }
    }

    Ok(FilterExpr::And(root))
}

fn parse_or_groups(value: &Value) -> Result<Vec<RawFilter>, FilterError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(group) if !group.is_empty() => {
                    Ok(FilterExpr::And(parse_group(group)?))
                }
                Value::Object(_) => Err(FilterError::Malformed(format!(
                    "Empty group in {}",
                    OR_KEY
                ))),
                _ => Err(FilterError::Malformed(format!(
                    "{} must be a list of objects",
                    OR_KEY
                ))),
            })
            .collect(),
        Value::Object(members) => members
            .iter()
            .map(|(column, value)| Ok(FilterExpr::And(parse_leaf(column, value)?)))
            .collect(),
        _ => Err(FilterError::Malformed(format!(
            "{} must be a list of objects",
            OR_KEY
        ))),
    }
}

fn parse_group(group: &Map<String, Value>) -> Result<Vec<RawFilter>, FilterError> {
    let mut conditions = Vec::new();
    for (column, value) in group {
        if column == OR_KEY {
            return Err(FilterError::Malformed(format!(
                "{} is only allowed at the top level",
                OR_KEY
            )));
        }
        conditions.extend(parse_leaf(column, value)?);
    }
    Ok(conditions)
}

/// Normalise one column entry into its conditions
fn parse_leaf(column: &str, value: &Value) -> Result<Vec<RawFilter>, FilterError> {
    match value {
        Value::Object(ops) => {
            if ops.is_empty() {
                return Err(FilterError::Malformed(format!(
                    "No operators given for column {}",
                    column
                )));
            }
            ops.iter()
                .map(|(name, literal)| {
                    let operator = Operator::from_name(name).ok_or_else(|| {
                        FilterError::DisallowedOperator {
                            column: column.to_string(),
                            operator: name.clone(),
                        }
                    })?;
                    check_scalar(column, literal)?;
                    Ok(FilterExpr::leaf(column, operator, literal.clone()))
                })
                .collect()
        }
        scalar => {
            check_scalar(column, scalar)?;
            Ok(vec![FilterExpr::leaf(column, Operator::Eq, scalar.clone())])
        }
    }
}

fn check_scalar(column: &str, value: &Value) -> Result<(), FilterError> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => Err(FilterError::Malformed(format!(
            "Filter value for column {} must be a string, number or boolean",
            column
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blank_input_is_empty_filter() {
        assert_eq!(parse_filters("").unwrap(), FilterExpr::empty());
        assert_eq!(parse_filters("  ").unwrap(), FilterExpr::empty());
        assert_eq!(parse_filters("{}").unwrap(), FilterExpr::empty());
    }

    #[test]
    fn test_scalar_becomes_eq() {
        let parsed = parse_filters(r#"{"fuel": "Gas"}"#).unwrap();
        assert_eq!(
            parsed,
            FilterExpr::And(vec![FilterExpr::leaf("fuel", Operator::Eq, json!("Gas"))])
        );
    }

    #[test]
    fn test_nested_operators_keep_order() {
        let parsed = parse_filters(r#"{"year": {"gte": 2010, "lt": 2021}}"#).unwrap();
        assert_eq!(
            parsed,
            FilterExpr::And(vec![
                FilterExpr::leaf("year", Operator::Gte, json!(2010)),
                FilterExpr::leaf("year", Operator::Lt, json!(2021)),
            ])
        );
    }

    #[test]
    fn test_or_block_follows_base() {
        let parsed =
            parse_filters(r#"{"$or": [{"fuel": "Gas"}, {"fuel": "Coal"}], "year": {"gt": 2020}}"#)
                .unwrap();
        assert_eq!(
            parsed,
            FilterExpr::And(vec![
                FilterExpr::leaf("year", Operator::Gt, json!(2020)),
                FilterExpr::Or(vec![
                    FilterExpr::And(vec![FilterExpr::leaf("fuel", Operator::Eq, json!("Gas"))]),
                    FilterExpr::And(vec![FilterExpr::leaf("fuel", Operator::Eq, json!("Coal"))]),
                ]),
            ])
        );
    }

    #[test]
    fn test_or_object_form() {
        let parsed = parse_filters(r#"{"$or": {"fuel": "Gas", "year": 2020}}"#).unwrap();
        let FilterExpr::And(root) = parsed else {
            panic!("expected AND root");
        };
        let FilterExpr::Or(groups) = &root[0] else {
            panic!("expected OR block");
        };
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_empty_or_list_is_ignored() {
        assert_eq!(parse_filters(r#"{"$or": []}"#).unwrap(), FilterExpr::empty());
    }

    #[test]
    fn test_malformed_shapes() {
        for input in [
            "[1, 2]",
            "not json",
            r#"{"year": null}"#,
            r#"{"year": [2020, 2021]}"#,
            r#"{"year": {}}"#,
            r#"{"$or": [{}]}"#,
            r#"{"$or": ["Gas"]}"#,
            r#"{"$or": "Gas"}"#,
            r#"{"$or": [{"$or": [{"fuel": "Gas"}]}]}"#,
            r#"{"year": {"gt": [1]}}"#,
        ] {
            assert!(
                matches!(parse_filters(input), Err(FilterError::Malformed(_))),
                "{} should be malformed",
                input
            );
        }
    }

    #[test]
    fn test_unknown_operator() {
        let err = parse_filters(r#"{"year": {"between": 2020}}"#).unwrap_err();
        assert!(matches!(err, FilterError::DisallowedOperator { .. }));
    }
}
