//! Identifier validation
//!
//! Collection names and column names end up inside SQL text as relation and
//! column identifiers, so they are checked once when configuration is loaded
//! and quoted wherever they are emitted. Table keys (e.g. `"1.1"`) are only
//! ever bound as parameters and get a lighter check.
//!
//! # Security
//!
//! Input validation prevents:
//! - SQL injection via malicious collection or column names
//! - Shadowing of bookkeeping columns by schema columns
//! - Excessively long identifiers

use thiserror::Error;

use crate::models::is_internal_column;

/// Maximum length for collection names
pub const MAX_COLLECTION_NAME_LENGTH: usize = 63;

/// Maximum length for column names
pub const MAX_COLUMN_NAME_LENGTH: usize = 255;

/// Maximum length for table keys
pub const MAX_TABLE_KEY_LENGTH: usize = 255;

/// Errors that can occur during identifier validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Input is empty when a value is required
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Input exceeds maximum allowed length
    #[error("{field} exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// Input contains invalid characters
    #[error("{field} contains invalid characters: {reason}")]
    InvalidCharacters { field: &'static str, reason: String },

    /// Input has invalid format
    #[error("{0}: {1}")]
    InvalidFormat(&'static str, String),

    /// Input is a reserved word
    #[error("{field} cannot be a reserved word: {word}")]
    ReservedWord { field: &'static str, word: String },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn validate_identifier(field: &'static str, name: &str, max: usize) -> ValidationResult<()> {
    let Some(first_char) = name.chars().next() else {
        return Err(ValidationError::Empty(field));
    };

    if name.len() > max {
        return Err(ValidationError::TooLong {
            field,
            max,
            actual: name.len(),
        });
    }

    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(ValidationError::InvalidFormat(
            field,
            "must start with a letter or underscore".to_string(),
        ));
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(ValidationError::InvalidCharacters {
                field,
                reason: format!("invalid character: '{}'", c),
            });
        }
    }

    if is_sql_reserved_word(name) {
        return Err(ValidationError::ReservedWord {
            field,
            word: name.to_string(),
        });
    }

    Ok(())
}

/// Validate a collection name.
///
/// # Rules
///
/// - Must not be empty or exceed 63 characters
/// - Must start with an ASCII letter or underscore
/// - May contain ASCII letters, digits and underscores
/// - Cannot be a SQL reserved word
///
/// # Examples
///
/// ```
/// use queens::validation::input::validate_collection_name;
///
/// assert!(validate_collection_name("dukes").is_ok());
/// assert!(validate_collection_name("energy_trends").is_ok());
/// assert!(validate_collection_name("").is_err());
/// assert!(validate_collection_name("dukes; DROP").is_err());
/// ```
pub fn validate_collection_name(name: &str) -> ValidationResult<()> {
    validate_identifier("collection name", name, MAX_COLLECTION_NAME_LENGTH)
}

/// Validate a schema column name.
///
/// Same rules as collection names, and the name must not collide with a
/// bookkeeping column (`row_id`, `ingest_id`, `ingest_ts`,
/// `table_description`).
///
/// # Examples
///
/// ```
/// use queens::validation::input::validate_column_name;
///
/// assert!(validate_column_name("year").is_ok());
/// assert!(validate_column_name("ingest_id").is_err());
/// assert!(validate_column_name("2020").is_err());
/// ```
pub fn validate_column_name(name: &str) -> ValidationResult<()> {
    validate_identifier("column name", name, MAX_COLUMN_NAME_LENGTH)?;

    if is_internal_column(name) {
        return Err(ValidationError::ReservedWord {
            field: "column name",
            word: name.to_string(),
        });
    }

    Ok(())
}

/// Validate a table key such as `"1.1"` or `"F.2"`.
///
/// Letters, digits, `.`, `_` and `-` are allowed.
pub fn validate_table_key(key: &str) -> ValidationResult<()> {
    if key.is_empty() {
        return Err(ValidationError::Empty("table key"));
    }

    if key.len() > MAX_TABLE_KEY_LENGTH {
        return Err(ValidationError::TooLong {
            field: "table key",
            max: MAX_TABLE_KEY_LENGTH,
            actual: key.len(),
        });
    }

    if let Some(c) = key
        .chars()
        .find(|c| !c.is_alphanumeric() && !matches!(c, '.' | '_' | '-'))
    {
        return Err(ValidationError::InvalidCharacters {
            field: "table key",
            reason: format!("invalid character: '{}'", c),
        });
    }

    Ok(())
}

/// Quote an identifier for DuckDB, doubling any embedded quote.
///
/// # Examples
///
/// ```
/// use queens::validation::input::quote_identifier;
///
/// assert_eq!(quote_identifier("dukes_prod"), "\"dukes_prod\"");
/// assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Check if a word is a SQL reserved word.
///
/// This is a basic check covering the words DuckDB refuses as bare
/// identifiers plus common type names.
fn is_sql_reserved_word(word: &str) -> bool {
    const RESERVED_WORDS: &[&str] = &[
        "select",
        "from",
        "where",
        "insert",
        "update",
        "delete",
        "create",
        "drop",
        "alter",
        "table",
        "index",
        "view",
        "database",
        "schema",
        "grant",
        "commit",
        "rollback",
        "begin",
        "end",
        "transaction",
        "primary",
        "foreign",
        "key",
        "references",
        "constraint",
        "unique",
        "check",
        "default",
        "not",
        "null",
        "and",
        "or",
        "in",
        "between",
        "like",
        "is",
        "case",
        "when",
        "then",
        "else",
        "as",
        "on",
        "join",
        "inner",
        "outer",
        "left",
        "right",
        "full",
        "cross",
        "natural",
        "using",
        "group",
        "by",
        "having",
        "order",
        "asc",
        "desc",
        "limit",
        "offset",
        "union",
        "intersect",
        "except",
        "all",
        "distinct",
        "values",
        "set",
        "into",
        "true",
        "false",
        "integer",
        "varchar",
        "text",
        "boolean",
        "date",
        "timestamp",
        "double",
        "decimal",
    ];

    let lower = word.to_lowercase();
    RESERVED_WORDS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_rules() {
        assert!(validate_collection_name("dukes").is_ok());
        assert!(validate_collection_name("_private").is_ok());
        assert!(matches!(
            validate_collection_name("select"),
            Err(ValidationError::ReservedWord { .. })
        ));
        assert!(matches!(
            validate_collection_name("dukes-2024"),
            Err(ValidationError::InvalidCharacters { .. })
        ));
        assert!(matches!(
            validate_collection_name(&"a".repeat(64)),
            Err(ValidationError::TooLong { max: 63, .. })
        ));
    }

    #[test]
    fn test_column_name_rejects_bookkeeping_names() {
        for name in ["row_id", "ingest_id", "ingest_ts", "table_description"] {
            assert!(validate_column_name(name).is_err(), "{name} accepted");
        }
        assert!(validate_column_name("table_name").is_ok());
    }

    #[test]
    fn test_column_name_rejects_quotes() {
        assert!(validate_column_name("x\"y").is_err());
        assert!(validate_column_name("fuel type").is_err());
    }

    #[test]
    fn test_table_key_rules() {
        assert!(validate_table_key("1.1").is_ok());
        assert!(validate_table_key("F.2").is_ok());
        assert!(validate_table_key("5.1_a").is_ok());
        assert!(validate_table_key("").is_err());
        assert!(validate_table_key("1.1'; --").is_err());
    }

    #[test]
    fn test_reserved_words_case_insensitive() {
        assert!(is_sql_reserved_word("SELECT"));
        assert!(is_sql_reserved_word("Order"));
        assert!(!is_sql_reserved_word("fuel"));
    }
}
