//! CLI binary entry point for queens

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use queens::cli::commands::info::{InfoArgs, handle_info, handle_versions};
#[cfg(feature = "cli")]
use queens::cli::commands::ingest::{IngestArgs, StageArgs, handle_ingest, handle_stage};
#[cfg(feature = "cli")]
use queens::cli::commands::init::{InitArgs, handle_init};
#[cfg(feature = "cli")]
use queens::cli::commands::query::{MetadataArgs, QueryArgs, handle_metadata, handle_query};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "queens")]
#[command(about = "Versioned ingest, as-of staging and filtered reads for statistics tables")]
#[command(version)]
struct Cli {
    /// Directory holding queens.toml
    #[arg(short, long, global = true, default_value = ".")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Write a sample configuration and create the store
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Ingest tables of a collection into its raw relation
    Ingest {
        /// Collection name
        collection: String,
        /// Table to ingest (repeatable; all configured tables when omitted)
        #[arg(short, long = "table")]
        tables: Vec<String>,
    },
    /// Rebuild the production relation from the latest successful ingests
    Stage {
        /// Collection name
        collection: String,
        /// Cutoff date (YYYY-MM-DD); now when omitted
        #[arg(long)]
        as_of_date: Option<String>,
    },
    /// Read one page of a staged table
    Query {
        /// Collection name
        collection: String,
        /// Table name
        table: String,
        /// Filter JSON, e.g. '{"year": {"gt": 2010}}'
        #[arg(long)]
        filters: Option<String>,
        /// Page size
        #[arg(short, long)]
        limit: Option<usize>,
        /// Cursor returned by the previous page
        #[arg(long)]
        cursor: Option<i64>,
        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Show the queryable columns of a staged table
    Metadata {
        /// Collection name
        collection: String,
        /// Table name
        table: String,
        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// List successful ingest versions
    Versions {
        /// Collection name
        collection: String,
        /// Restrict to one table
        #[arg(short, long)]
        table: Option<String>,
        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Summarise what is currently in production
    Info {
        /// Collection name
        collection: String,
        /// Restrict to one table
        #[arg(short, long)]
        table: Option<String>,
        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

#[cfg(feature = "cli")]
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "queens=debug" } else { "queens=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_dir = cli.config;
    let result = match cli.command {
        Commands::Init { force } => handle_init(&InitArgs { config_dir, force }),
        Commands::Ingest { collection, tables } => {
            let args = IngestArgs {
                config_dir,
                collection,
                tables,
            };
            handle_ingest(&args)
        }
        Commands::Stage {
            collection,
            as_of_date,
        } => {
            let args = StageArgs {
                config_dir,
                collection,
                as_of_date,
            };
            handle_stage(&args)
        }
        Commands::Query {
            collection,
            table,
            filters,
            limit,
            cursor,
            format,
        } => {
            let args = QueryArgs {
                config_dir,
                collection,
                table,
                filters,
                limit,
                cursor,
                format,
            };
            handle_query(&args)
        }
        Commands::Metadata {
            collection,
            table,
            format,
        } => {
            let args = MetadataArgs {
                config_dir,
                collection,
                table,
                format,
            };
            handle_metadata(&args)
        }
        Commands::Versions {
            collection,
            table,
            format,
        } => handle_versions(&InfoArgs {
            config_dir,
            collection,
            table,
            format,
        }),
        Commands::Info {
            collection,
            table,
            format,
        } => handle_info(&InfoArgs {
            config_dir,
            collection,
            table,
            format,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
