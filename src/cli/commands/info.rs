//! Read-only views of ingest history and production state

use std::path::PathBuf;

use super::open_service;
use crate::cli::error::CliError;
use crate::database::{OutputFormat, QueryResult, format_query_result};

/// Versions and info command arguments
#[derive(Debug, Clone)]
pub struct InfoArgs {
    pub config_dir: PathBuf,
    pub collection: String,
    pub table: Option<String>,
    pub format: String,
}

impl InfoArgs {
    fn output_format(&self) -> Result<OutputFormat, CliError> {
        self.format
            .parse()
            .map_err(|e: String| CliError::InvalidArgument(e))
    }
}

/// List successful ingest versions
pub fn handle_versions(args: &InfoArgs) -> Result<(), CliError> {
    let format = args.output_format()?;
    let service = open_service(&args.config_dir)?;
    let versions = service.versions(&args.collection, args.table.as_deref())?;

    println!(
        "{}",
        format_query_result(&QueryResult::from_records(&versions), format)
    );
    Ok(())
}

/// Summarise the tables currently in production
pub fn handle_info(args: &InfoArgs) -> Result<(), CliError> {
    let format = args.output_format()?;
    let service = open_service(&args.config_dir)?;
    let summary = service.staged_summary(&args.collection, args.table.as_deref())?;

    if summary.is_empty() && format != OutputFormat::Json {
        println!("Nothing staged for {}", args.collection);
        return Ok(());
    }
    println!(
        "{}",
        format_query_result(&QueryResult::from_records(&summary), format)
    );
    Ok(())
}
