//! Enums shared across the ingest, staging and query paths
//!
//! `SqlType` uses `UPPERCASE` serde names so config files read the way the
//! column types appear in DDL (`type = "REAL"`); lowercase aliases are
//! accepted for hand-written configs.

use serde::{Deserialize, Serialize};

/// Declared SQL type of a collection column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlType {
    #[serde(alias = "text")]
    Text,
    #[serde(alias = "integer")]
    Integer,
    #[serde(alias = "real")]
    Real,
    #[serde(alias = "datetime")]
    Datetime,
}

impl SqlType {
    /// Physical DuckDB type used for raw and production relations
    ///
    /// DATETIME is stored as text: values are passed through uncast and
    /// carry no canonical format.
    pub fn ddl_type(&self) -> &'static str {
        match self {
            SqlType::Text => "VARCHAR",
            SqlType::Integer => "BIGINT",
            SqlType::Real => "DOUBLE",
            SqlType::Datetime => "VARCHAR",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlType::Integer | SqlType::Real)
    }
}

impl std::str::FromStr for SqlType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TEXT" => Ok(SqlType::Text),
            "INTEGER" => Ok(SqlType::Integer),
            "REAL" => Ok(SqlType::Real),
            "DATETIME" => Ok(SqlType::Datetime),
            _ => Err(format!(
                "Unknown SQL type: {}. Use TEXT, INTEGER, REAL or DATETIME.",
                s
            )),
        }
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlType::Text => write!(f, "TEXT"),
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::Real => write!(f, "REAL"),
            SqlType::Datetime => write!(f, "DATETIME"),
        }
    }
}
