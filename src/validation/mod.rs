//! Validation functionality
//!
//! Provides validation logic for:
//! - Identifier validation for collection, column and table names (security)
//! - Schema validation and casting of transformed datasets

pub mod input;
pub mod schema;

pub use input::{
    ValidationError, quote_identifier, validate_collection_name, validate_column_name,
    validate_table_key,
};
pub use schema::{SchemaError, cast_value, validate_dataset};
