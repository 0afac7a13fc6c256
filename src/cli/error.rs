//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::error::ServiceError;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Config directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Configuration already exists: {0}")]
    AlreadyInitialized(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} (status {status})", status = .0.status_code())]
    Service(#[from] ServiceError),

    #[error("{0}")]
    IngestFailed(String),
}
