//! Transform registry
//!
//! A transform turns one configured table's source into shaped row data.
//! Tables name their transform by a string key in configuration; keys are
//! resolved against a registry built once at startup, and a key with no
//! registered function is a configuration error rather than a crash.

pub mod json_records;
pub mod sources;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{ConfigError, ConfigResult};
use crate::models::Dataset;

pub use sources::{ConfiguredSources, SourceResolver};

/// Errors raised by transforms
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error in {path} at record {record}: {error}")]
    JsonParse {
        path: PathBuf,
        record: usize,
        error: String,
    },

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Invalid transform arguments: {0}")]
    InvalidArgs(String),

    #[error("Transform produced no data for table {0}")]
    MissingTable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything a transform knows about the table it shapes
#[derive(Debug, Clone, PartialEq)]
pub struct TransformContext {
    pub collection: String,
    pub table_name: String,
    /// Resolved source location
    pub url: String,
    /// Free-form arguments from the table configuration
    pub args: Map<String, Value>,
    /// Directory relative sources are resolved against
    pub base_dir: Option<PathBuf>,
}

impl TransformContext {
    pub fn new(
        collection: impl Into<String>,
        table_name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            table_name: table_name.into(),
            url: url.into(),
            args: Map::new(),
            base_dir: None,
        }
    }

    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }
}

/// Output of a transform: shaped datasets keyed by table key
pub type TransformOutput = BTreeMap<String, Dataset>;

/// A registered transform
pub type TransformFn =
    Arc<dyn Fn(&TransformContext) -> Result<TransformOutput, TransformError> + Send + Sync>;

/// Registry mapping transform keys to functions
#[derive(Clone)]
pub struct TransformRegistry {
    transforms: HashMap<String, TransformFn>,
}

impl TransformRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// A registry holding the built-in transforms
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(json_records::KEY, json_records::transform);
        registry
    }

    /// Register a transform, replacing any previous one under the key
    pub fn register<F>(&mut self, key: impl Into<String>, transform: F)
    where
        F: Fn(&TransformContext) -> Result<TransformOutput, TransformError> + Send + Sync + 'static,
    {
        self.transforms.insert(key.into(), Arc::new(transform));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.transforms.contains_key(key)
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Resolve the transform configured for a table
    pub fn resolve(
        &self,
        collection: &str,
        table_name: &str,
        key: &str,
    ) -> ConfigResult<TransformFn> {
        self.transforms
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownTransform {
                collection: collection.to_string(),
                table_name: table_name.to_string(),
                transform: key.to_string(),
            })
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.keys())
            .finish()
    }
}
