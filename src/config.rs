//! Service configuration file support
//!
//! Handles parsing of `queens.toml` configuration files and environment
//! variable overrides. The configuration is read once at startup and passed
//! by reference to every component; nothing reads ambient settings later.
//!
//! ```toml
//! [database]
//! path = "queens.duckdb"
//!
//! [api]
//! default_limit = 1000
//! max_limit = 5000
//!
//! [collections.dukes]
//! columns = [
//!     { name = "year", type = "INTEGER", nullable = false },
//!     { name = "fuel", type = "TEXT" },
//!     { name = "value", type = "REAL" },
//! ]
//!
//! [collections.dukes.tables."1.1"]
//! transform = "json_records"
//! url = "data/dukes_1_1.json"
//! description = "Aggregate energy balance"
//! args = { index = ["year", "fuel"] }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{CollectionSchema, ColumnDef, SqlType, TABLE_NAME_COLUMN};
use crate::validation::input::{
    validate_collection_name, validate_column_name, validate_table_key,
};

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "queens.toml";

/// Default database filename
pub const DEFAULT_DB_FILENAME: &str = "queens.duckdb";

/// Default page size for queries
pub const DEFAULT_LIMIT: usize = 1000;

/// Upper bound on page size for queries
pub const MAX_LIMIT: usize = 5000;

/// Environment variable for the database path
pub const ENV_DB_PATH: &str = "QUEENS_DB_PATH";

/// Environment variable for the default page size
pub const ENV_DEFAULT_LIMIT: &str = "QUEENS_DEFAULT_LIMIT";

/// Environment variable for the maximum page size
pub const ENV_MAX_LIMIT: &str = "QUEENS_MAX_LIMIT";

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No such data collection: {0}")]
    UnknownCollection(String),

    #[error("No such table {table_name} in data collection {collection}")]
    UnknownTable {
        collection: String,
        table_name: String,
    },

    #[error("Unknown transform '{transform}' configured for {collection} {table_name}")]
    UnknownTransform {
        collection: String,
        table_name: String,
        transform: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Database configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Path to the DuckDB file (relative to the config directory, or absolute)
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    DEFAULT_DB_FILENAME.to_string()
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Read API configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "max_limit")]
    pub max_limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn max_limit() -> usize {
    MAX_LIMIT
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

/// A table of a collection and how to produce it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Registry key of the transform producing this table
    pub transform: String,

    /// Source location handed to the transform
    #[serde(default)]
    pub url: String,

    /// Description joined into production rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Transform-specific arguments
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,
}

impl TableConfig {
    pub fn new(transform: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            transform: transform.into(),
            url: url.into(),
            description: None,
            args: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.args.insert(key.into(), value);
        self
    }
}

/// A collection: one column schema shared by many tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub columns: Vec<ColumnDef>,

    #[serde(default)]
    pub tables: BTreeMap<String, TableConfig>,
}

/// Main configuration structure
///
/// Represents the `queens.toml` configuration file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServiceConfig {
    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub collections: BTreeMap<String, CollectionConfig>,
}

impl ServiceConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection (builder style, mostly for embedding and tests)
    pub fn with_collection(
        mut self,
        name: impl Into<String>,
        columns: Vec<ColumnDef>,
        tables: impl IntoIterator<Item = (String, TableConfig)>,
    ) -> Self {
        self.collections.insert(
            name.into(),
            CollectionConfig {
                columns,
                tables: tables.into_iter().collect(),
            },
        );
        self
    }

    /// Load configuration from a directory
    ///
    /// Looks for `queens.toml` in the directory and falls back to defaults
    /// if not found. Environment overrides are applied before validation.
    pub fn load(dir: &Path) -> ConfigResult<Self> {
        let config_path = dir.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(format!("{}: {}", config_path.display(), e)))?;

            Self::parse_unchecked(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config = Self::parse_unchecked(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_unchecked(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a directory
    pub fn save(&self, dir: &Path) -> ConfigResult<()> {
        let config_path = dir.join(CONFIG_FILENAME);
        let content = self.to_toml()?;

        std::fs::write(&config_path, content)
            .map_err(|e| ConfigError::Io(format!("{}: {}", config_path.display(), e)))?;

        Ok(())
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialization(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            self.database.path = path;
        }

        if let Ok(limit) = std::env::var(ENV_DEFAULT_LIMIT)
            && let Ok(limit) = limit.parse()
        {
            self.api.default_limit = limit;
        }

        if let Ok(limit) = std::env::var(ENV_MAX_LIMIT)
            && let Ok(limit) = limit.parse()
        {
            self.api.max_limit = limit;
        }
    }

    /// Check limits, identifiers and column declarations
    pub fn validate(&self) -> ConfigResult<()> {
        if self.api.max_limit == 0 {
            return Err(ConfigError::Invalid("api.max_limit must be at least 1".into()));
        }
        if self.api.default_limit == 0 || self.api.default_limit > self.api.max_limit {
            return Err(ConfigError::Invalid(format!(
                "api.default_limit must be between 1 and {}",
                self.api.max_limit
            )));
        }

        for (name, collection) in &self.collections {
            validate_collection_name(name)
                .map_err(|e| ConfigError::Invalid(format!("collection {}: {}", name, e)))?;

            if collection.columns.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "collection {} declares no columns",
                    name
                )));
            }

            let mut seen = Vec::with_capacity(collection.columns.len());
            for column in &collection.columns {
                validate_column_name(&column.name).map_err(|e| {
                    ConfigError::Invalid(format!("collection {}: {}", name, e))
                })?;
                if seen.contains(&column.name.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "collection {} declares column {} twice",
                        name, column.name
                    )));
                }
                if column.name == TABLE_NAME_COLUMN && column.sql_type != SqlType::Text {
                    return Err(ConfigError::Invalid(format!(
                        "collection {}: {} must be TEXT",
                        name, TABLE_NAME_COLUMN
                    )));
                }
                seen.push(column.name.as_str());
            }

            for key in collection.tables.keys() {
                validate_table_key(key)
                    .map_err(|e| ConfigError::Invalid(format!("collection {}: {}", name, e)))?;
            }
        }

        Ok(())
    }

    /// Resolve the database path against the config directory
    pub fn db_path(&self, dir: &Path) -> PathBuf {
        if self.database.path.is_empty() {
            dir.join(DEFAULT_DB_FILENAME)
        } else if Path::new(&self.database.path).is_absolute() {
            PathBuf::from(&self.database.path)
        } else {
            dir.join(&self.database.path)
        }
    }

    /// Look up a collection
    pub fn collection(&self, name: &str) -> ConfigResult<&CollectionConfig> {
        self.collections
            .get(name)
            .ok_or_else(|| ConfigError::UnknownCollection(name.to_string()))
    }

    /// Look up a configured table of a collection
    pub fn table(&self, collection: &str, table_name: &str) -> ConfigResult<&TableConfig> {
        self.collection(collection)?
            .tables
            .get(table_name)
            .ok_or_else(|| ConfigError::UnknownTable {
                collection: collection.to_string(),
                table_name: table_name.to_string(),
            })
    }

    /// Build the static schema of every collection
    pub fn schemas(&self) -> BTreeMap<String, CollectionSchema> {
        self.collections
            .iter()
            .map(|(name, c)| (name.clone(), CollectionSchema::new(name, c.columns.clone())))
            .collect()
    }

    /// Check if a configuration file exists in a directory
    pub fn exists(dir: &Path) -> bool {
        dir.join(CONFIG_FILENAME).exists()
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# QUEENS configuration

[database]
# Path to the DuckDB database file (relative to this file, or absolute)
path = "queens.duckdb"

[api]
# Page size when a query does not ask for one
default_limit = 1000
# Requested page sizes are clamped to this value
max_limit = 5000

# One schema per collection; every table of the collection shares it.
# `table_name` is added automatically.
[collections.dukes]
columns = [
    { name = "year", type = "INTEGER", nullable = false },
    { name = "fuel", type = "TEXT" },
    { name = "unit", type = "TEXT" },
    { name = "value", type = "REAL" },
]

# Tables: registry key of the transform, its source, and optional arguments
[collections.dukes.tables."1.1"]
transform = "json_records"
url = "data/dukes_1_1.json"
description = "Commodity balances"
args = { index = ["year", "fuel"] }
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::new();
        assert_eq!(config.database.path, DEFAULT_DB_FILENAME);
        assert_eq!(config.api.default_limit, 1000);
        assert_eq!(config.api.max_limit, 5000);
        assert!(config.collections.is_empty());
    }

    #[test]
    fn test_sample_config_is_valid() {
        let config = ServiceConfig::parse(sample_config()).unwrap();
        let dukes = config.collection("dukes").unwrap();
        assert_eq!(dukes.columns.len(), 4);
        let table = config.table("dukes", "1.1").unwrap();
        assert_eq!(table.transform, "json_records");
        assert_eq!(table.args["index"], serde_json::json!(["year", "fuel"]));
    }

    #[test]
    fn test_unknown_collection_and_table() {
        let config = ServiceConfig::parse(sample_config()).unwrap();
        assert_eq!(
            config.collection("trends").unwrap_err(),
            ConfigError::UnknownCollection("trends".to_string())
        );
        assert!(matches!(
            config.table("dukes", "9.9"),
            Err(ConfigError::UnknownTable { .. })
        ));
    }

    #[test]
    fn test_rejects_unsafe_collection_name() {
        let toml = r#"
[collections."dukes; drop"]
columns = [{ name = "year", type = "INTEGER" }]
"#;
        assert!(matches!(
            ServiceConfig::parse(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_bookkeeping_column() {
        let toml = r#"
[collections.dukes]
columns = [{ name = "ingest_id", type = "INTEGER" }]
"#;
        assert!(ServiceConfig::parse(toml).is_err());
    }

    #[test]
    fn test_rejects_non_text_table_name() {
        let toml = r#"
[collections.dukes]
columns = [{ name = "table_name", type = "INTEGER" }]
"#;
        assert!(ServiceConfig::parse(toml).is_err());
    }

    #[test]
    fn test_rejects_inverted_limits() {
        let toml = r#"
[api]
default_limit = 100
max_limit = 10
"#;
        assert!(ServiceConfig::parse(toml).is_err());
    }

    #[test]
    fn test_schemas_include_table_name() {
        let config = ServiceConfig::parse(sample_config()).unwrap();
        let schemas = config.schemas();
        let dukes = &schemas["dukes"];
        assert!(dukes.contains(TABLE_NAME_COLUMN));
        assert_eq!(dukes.column("value").unwrap().sql_type, SqlType::Real);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config = ServiceConfig::parse(sample_config()).unwrap();

        config.save(dir.path()).unwrap();
        assert!(ServiceConfig::exists(dir.path()));

        let loaded = ServiceConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.collections, config.collections);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let loaded = ServiceConfig::load(dir.path()).unwrap();
        assert!(loaded.collections.is_empty());
    }

    #[test]
    fn test_db_path() {
        let mut config = ServiceConfig::new();
        config.database.path = "stats.duckdb".to_string();
        assert_eq!(
            config.db_path(Path::new("/srv/queens")),
            PathBuf::from("/srv/queens/stats.duckdb")
        );
        config.database.path = "/var/lib/queens.duckdb".to_string();
        assert_eq!(
            config.db_path(Path::new("/srv/queens")),
            PathBuf::from("/var/lib/queens.duckdb")
        );
    }
}
