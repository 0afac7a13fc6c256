//! Source resolution
//!
//! Maps a table key to the location its transform reads from. Scraping
//! release pages for current download links is left to custom resolvers.

use crate::config::{ConfigResult, ServiceConfig};

/// Resolve a table to its source location
pub trait SourceResolver: Send + Sync {
    fn resolve(&self, collection: &str, table_name: &str) -> ConfigResult<String>;
}

/// Resolver returning the `url` configured for each table
#[derive(Debug, Clone)]
pub struct ConfiguredSources {
    config: ServiceConfig,
}

impl ConfiguredSources {
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }
}

impl SourceResolver for ConfiguredSources {
    fn resolve(&self, collection: &str, table_name: &str) -> ConfigResult<String> {
        Ok(self.config.table(collection, table_name)?.url.clone())
    }
}
