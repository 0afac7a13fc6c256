//! Filter expression tree
//!
//! The parser produces a [`RawFilter`] holding request literals as JSON;
//! validation maps it into a [`TypedFilter`] whose literals are cast to the
//! column types. The root is always an `And` of the base group, followed by
//! at most one `Or` of the alternative groups.

use serde_json::Value;

use crate::models::{SqlType, SqlValue};

/// Comparison operators accepted in filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

const NUMERIC_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::Neq,
    Operator::Lt,
    Operator::Lte,
    Operator::Gt,
    Operator::Gte,
];

const TEXT_OPERATORS: &[Operator] = &[Operator::Eq, Operator::Neq, Operator::Like];

impl Operator {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Operator::Eq),
            "neq" => Some(Operator::Neq),
            "lt" => Some(Operator::Lt),
            "lte" => Some(Operator::Lte),
            "gt" => Some(Operator::Gt),
            "gte" => Some(Operator::Gte),
            "like" => Some(Operator::Like),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Like => "like",
        }
    }

    /// SQL comparison with its placeholder
    pub fn sql(&self) -> &'static str {
        match self {
            Operator::Eq => "= ?",
            Operator::Neq => "<> ?",
            Operator::Lt => "< ?",
            Operator::Lte => "<= ?",
            Operator::Gt => "> ?",
            Operator::Gte => ">= ?",
            Operator::Like => "LIKE ?",
        }
    }

    /// Operators permitted on a column of the given type
    pub fn allowed_for(sql_type: SqlType) -> &'static [Operator] {
        if sql_type.is_numeric() {
            NUMERIC_OPERATORS
        } else if sql_type == SqlType::Text {
            TEXT_OPERATORS
        } else {
            &[]
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single `column OP literal` comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Condition<L> {
    pub column: String,
    pub operator: Operator,
    pub literal: L,
}

/// Filter expression
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr<L> {
    Leaf(Condition<L>),
    And(Vec<FilterExpr<L>>),
    Or(Vec<FilterExpr<L>>),
}

/// Filter as parsed from a request
pub type RawFilter = FilterExpr<Value>;

/// Filter with literals cast to their column types
pub type TypedFilter = FilterExpr<SqlValue>;

impl<L> FilterExpr<L> {
    pub fn leaf(column: impl Into<String>, operator: Operator, literal: L) -> Self {
        FilterExpr::Leaf(Condition {
            column: column.into(),
            operator,
            literal,
        })
    }

    /// The filter matching every row
    pub fn empty() -> Self {
        FilterExpr::And(Vec::new())
    }

    /// All conditions in left-to-right order
    pub fn conditions(&self) -> Vec<&Condition<L>> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition<L>>) {
        match self {
            FilterExpr::Leaf(c) => out.push(c),
            FilterExpr::And(children) | FilterExpr::Or(children) => {
                for child in children {
                    child.collect_conditions(out);
                }
            }
        }
    }

    /// Rebuild the tree, converting every literal
    ///
    /// Stops at the first failing conversion.
    pub fn try_map<M, E>(
        &self,
        f: &mut impl FnMut(&Condition<L>) -> Result<M, E>,
    ) -> Result<FilterExpr<M>, E> {
        Ok(match self {
            FilterExpr::Leaf(c) => FilterExpr::Leaf(Condition {
                column: c.column.clone(),
                operator: c.operator,
                literal: f(c)?,
            }),
            FilterExpr::And(children) => FilterExpr::And(
                children
                    .iter()
                    .map(|child| child.try_map(f))
                    .collect::<Result<_, _>>()?,
            ),
            FilterExpr::Or(children) => FilterExpr::Or(
                children
                    .iter()
                    .map(|child| child.try_map(f))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}
