//! Ingest and stage commands

use std::path::PathBuf;

use chrono::NaiveDate;

use super::open_service;
use crate::cli::error::CliError;

/// Ingest command arguments
#[derive(Debug, Clone)]
pub struct IngestArgs {
    pub config_dir: PathBuf,
    pub collection: String,
    /// Tables to ingest; empty means every configured table
    pub tables: Vec<String>,
}

/// Ingest tables of a collection
pub fn handle_ingest(args: &IngestArgs) -> Result<(), CliError> {
    let service = open_service(&args.config_dir)?;
    let tables = (!args.tables.is_empty()).then_some(args.tables.as_slice());

    let report = service.ingest(&args.collection, tables)?;

    println!(
        "Ingested {} table(s), {} record(s) into {} in {}",
        report.tables_ingested,
        report.records_ingested,
        report.collection,
        report.duration_string()
    );
    for (table, ingest_id) in &report.ingest_ids {
        println!("  {} -> ingest {}", table, ingest_id);
    }

    if !report.is_success() {
        for error in &report.errors {
            eprintln!("  {}", error);
        }
        return Err(CliError::IngestFailed(format!(
            "{} table(s) failed to ingest",
            report.tables_failed
        )));
    }
    Ok(())
}

/// Stage command arguments
#[derive(Debug, Clone)]
pub struct StageArgs {
    pub config_dir: PathBuf,
    pub collection: String,
    /// Cutoff date as `YYYY-MM-DD`; now when absent
    pub as_of_date: Option<String>,
}

fn parse_date(s: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
        CliError::InvalidArgument(format!("Invalid date '{}' (expected YYYY-MM-DD): {}", s, e))
    })
}

/// Rebuild a collection's production relation
pub fn handle_stage(args: &StageArgs) -> Result<(), CliError> {
    let as_of_date = args.as_of_date.as_deref().map(parse_date).transpose()?;
    let service = open_service(&args.config_dir)?;

    let report = service.stage(&args.collection, as_of_date)?;
    println!(
        "Staged {}: {} table(s), {} row(s) as of {}",
        report.collection, report.tables, report.rows, report.cutoff
    );
    Ok(())
}
