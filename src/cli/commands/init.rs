//! Initialise a config directory

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::config::{CONFIG_FILENAME, ServiceConfig, sample_config};
use crate::error::ServiceError;
use crate::service::StatsService;

/// Init command arguments
#[derive(Debug, Clone)]
pub struct InitArgs {
    pub config_dir: PathBuf,
    /// Overwrite an existing configuration
    pub force: bool,
}

/// Write a sample configuration and create the store
pub fn handle_init(args: &InitArgs) -> Result<(), CliError> {
    let dir = &args.config_dir;
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !args.force {
        return Err(CliError::AlreadyInitialized(config_path));
    }

    std::fs::create_dir_all(dir).map_err(|e| {
        CliError::InvalidArgument(format!("Failed to create {}: {}", dir.display(), e))
    })?;
    std::fs::write(&config_path, sample_config()).map_err(|e| {
        CliError::InvalidArgument(format!("Failed to write {}: {}", config_path.display(), e))
    })?;

    let service = StatsService::open(dir)?;
    let config: &ServiceConfig = service.config();
    let healthy = service.backend().health_check().map_err(ServiceError::from)?;

    println!("Wrote {}", config_path.display());
    println!(
        "Store: {} ({})",
        config.db_path(dir).display(),
        if healthy { "ok" } else { "unresponsive" }
    );
    println!(
        "Collections: {}",
        config
            .collections
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}
