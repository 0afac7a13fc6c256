//! Query and metadata commands
//!
//! Reads one page of a staged table and prints it in the requested format.

use std::path::PathBuf;

use serde_json::{Map, Value};

use super::open_service;
use crate::cli::error::CliError;
use crate::database::{OutputFormat, QueryResult, format_query_result};
use crate::models::QueryResponse;

/// Query command arguments
#[derive(Debug, Clone)]
pub struct QueryArgs {
    pub config_dir: PathBuf,
    pub collection: String,
    pub table: String,
    /// Filter JSON
    pub filters: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<i64>,
    /// Output format
    pub format: String,
}

/// Columns of a page in first-seen order
fn page_result(data: &[Map<String, Value>]) -> QueryResult {
    let mut columns: Vec<String> = Vec::new();
    for row in data {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    QueryResult::new(
        columns,
        data.iter().cloned().map(Value::Object).collect(),
    )
}

fn print_page(response: &QueryResponse, format: OutputFormat) -> Result<(), CliError> {
    if format == OutputFormat::Json {
        let json = serde_json::to_string_pretty(response)
            .map_err(|e| CliError::InvalidArgument(format!("Failed to render JSON: {}", e)))?;
        println!("{}", json);
        return Ok(());
    }

    if let Some(description) = &response.table_description {
        eprintln!("{}", description);
    }
    println!("{}", format_query_result(&page_result(&response.data), format));
    if let Some(cursor) = response.next_cursor {
        eprintln!("\nNext cursor: {}", cursor);
    }
    Ok(())
}

/// Read one page of a staged table
pub fn handle_query(args: &QueryArgs) -> Result<(), CliError> {
    let output_format: OutputFormat = args
        .format
        .parse()
        .map_err(|e: String| CliError::InvalidArgument(e))?;

    let service = open_service(&args.config_dir)?;
    let response = service.query(
        &args.collection,
        &args.table,
        args.filters.as_deref(),
        args.limit,
        args.cursor,
    )?;

    print_page(&response, output_format)
}

/// Metadata command arguments
#[derive(Debug, Clone)]
pub struct MetadataArgs {
    pub config_dir: PathBuf,
    pub collection: String,
    pub table: String,
    pub format: String,
}

/// Print the queryable columns of a staged table
pub fn handle_metadata(args: &MetadataArgs) -> Result<(), CliError> {
    let output_format: OutputFormat = args
        .format
        .parse()
        .map_err(|e: String| CliError::InvalidArgument(e))?;

    let service = open_service(&args.config_dir)?;
    let metadata = service.metadata(&args.collection, &args.table)?;

    println!(
        "{}",
        format_query_result(&QueryResult::from_records(&metadata), output_format)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_result_unions_columns() {
        let data = vec![
            json!({"table_name": "1.1", "year": 2020}).as_object().cloned().unwrap(),
            json!({"table_name": "1.1", "value": 2.5}).as_object().cloned().unwrap(),
        ];
        let result = page_result(&data);
        assert_eq!(result.columns, vec!["table_name", "year", "value"]);
        assert_eq!(result.row_count(), 2);
    }
}
