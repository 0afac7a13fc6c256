//! SQL compilation of validated filters
//!
//! Every literal becomes a `?` placeholder and is pushed onto the parameter
//! list at the moment its placeholder is written, so the two can never fall
//! out of step.

use super::ast::{FilterExpr, Operator, TypedFilter};
use crate::models::{SqlValue, TABLE_NAME_COLUMN};
use crate::validation::input::quote_identifier;

/// A compiled WHERE predicate with its bound values
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub where_sql: String,
    pub params: Vec<SqlValue>,
}

impl CompiledFilter {
    pub fn placeholder_count(&self) -> usize {
        self.where_sql.matches('?').count()
    }
}

/// Accumulates SQL text and parameters together
#[derive(Default)]
struct PredicateBuilder {
    sql: String,
    params: Vec<SqlValue>,
}

impl PredicateBuilder {
    fn sql(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, column: &str, operator: Operator, value: &SqlValue) {
        self.sql.push_str(&quote_identifier(column));
        self.sql.push(' ');
        self.sql.push_str(operator.sql());
        self.params.push(value.clone());
    }

    /// Write an expression; `grouped` parenthesises a multi-condition AND
    fn expr(&mut self, expr: &TypedFilter, grouped: bool) {
        match expr {
            FilterExpr::Leaf(c) => self.bind(&c.column, c.operator, &c.literal),
            FilterExpr::And(children) if children.is_empty() => self.sql("TRUE"),
            FilterExpr::Or(children) if children.is_empty() => self.sql("FALSE"),
            FilterExpr::And(children) => {
                let parens = grouped && children.len() > 1;
                self.joined(children, " AND ", parens);
            }
            FilterExpr::Or(children) => self.joined(children, " OR ", true),
        }
    }

    fn joined(&mut self, children: &[TypedFilter], separator: &str, parens: bool) {
        if parens {
            self.sql("(");
        }
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                self.sql(separator);
            }
            self.expr(child, true);
        }
        if parens {
            self.sql(")");
        }
    }
}

/// Compile a validated filter scoped to one table
///
/// `"table_name" = ?` always leads the predicate, followed by the base
/// conditions and the parenthesised OR block.
pub fn compile(table_name: &str, filter: &TypedFilter) -> CompiledFilter {
    let mut builder = PredicateBuilder::default();
    builder.bind(
        TABLE_NAME_COLUMN,
        Operator::Eq,
        &SqlValue::Text(table_name.to_string()),
    );

    let rest: &[TypedFilter] = match filter {
        FilterExpr::And(children) => children,
        other => std::slice::from_ref(other),
    };
    for child in rest {
        builder.sql(" AND ");
        builder.expr(child, true);
    }

    CompiledFilter {
        where_sql: builder.sql,
        params: builder.params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(column: &str, operator: Operator, v: i64) -> TypedFilter {
        FilterExpr::leaf(column, operator, SqlValue::Integer(v))
    }

    fn text(column: &str, operator: Operator, v: &str) -> TypedFilter {
        FilterExpr::leaf(column, operator, SqlValue::Text(v.to_string()))
    }

    #[test]
    fn test_empty_filter_only_scopes_table() {
        let compiled = compile("1.1", &FilterExpr::empty());
        assert_eq!(compiled.where_sql, "\"table_name\" = ?");
        assert_eq!(compiled.params, vec![SqlValue::Text("1.1".to_string())]);
    }

    #[test]
    fn test_base_conditions_in_order() {
        let filter = FilterExpr::And(vec![
            int("year", Operator::Gte, 2010),
            int("year", Operator::Lt, 2021),
            text("fuel", Operator::Like, "%gas%"),
        ]);
        let compiled = compile("1.1", &filter);
        assert_eq!(
            compiled.where_sql,
            "\"table_name\" = ? AND \"year\" >= ? AND \"year\" < ? AND \"fuel\" LIKE ?"
        );
        assert_eq!(
            compiled.params,
            vec![
                SqlValue::Text("1.1".to_string()),
                SqlValue::Integer(2010),
                SqlValue::Integer(2021),
                SqlValue::Text("%gas%".to_string()),
            ]
        );
    }

    #[test]
    fn test_or_block_is_parenthesised() {
        let filter = FilterExpr::And(vec![
            int("year", Operator::Gt, 2020),
            FilterExpr::Or(vec![
                FilterExpr::And(vec![text("fuel", Operator::Eq, "Gas")]),
                FilterExpr::And(vec![text("fuel", Operator::Eq, "Coal")]),
            ]),
        ]);
        let compiled = compile("1.1", &filter);
        assert_eq!(
            compiled.where_sql,
            "\"table_name\" = ? AND \"year\" > ? AND (\"fuel\" = ? OR \"fuel\" = ?)"
        );
        assert_eq!(compiled.params.len(), 4);
        assert_eq!(compiled.params[3], SqlValue::Text("Coal".to_string()));
    }

    #[test]
    fn test_multi_condition_groups_are_parenthesised() {
        let filter = FilterExpr::And(vec![FilterExpr::Or(vec![
            FilterExpr::And(vec![
                text("fuel", Operator::Eq, "Gas"),
                int("year", Operator::Gt, 2020),
            ]),
            FilterExpr::And(vec![text("fuel", Operator::Neq, "Coal")]),
        ])]);
        let compiled = compile("1.1", &filter);
        assert_eq!(
            compiled.where_sql,
            "\"table_name\" = ? AND ((\"fuel\" = ? AND \"year\" > ?) OR \"fuel\" <> ?)"
        );
        assert_eq!(compiled.placeholder_count(), compiled.params.len());
    }
}
