//! CLI command implementations

pub mod info;
pub mod ingest;
pub mod init;
pub mod query;

use std::path::Path;

use crate::cli::error::CliError;
use crate::config::{CONFIG_FILENAME, ServiceConfig};
use crate::service::StatsService;

/// Open the service configured in `dir`
pub fn open_service(dir: &Path) -> Result<StatsService, CliError> {
    if !dir.is_dir() {
        return Err(CliError::DirectoryNotFound(dir.to_path_buf()));
    }
    if !ServiceConfig::exists(dir) {
        return Err(CliError::InvalidArgument(format!(
            "No {} in {}. Run 'queens init' first.",
            CONFIG_FILENAME,
            dir.display()
        )));
    }
    Ok(StatsService::open(dir)?)
}
