//! Built-in `json_records` transform
//!
//! Reads already-shaped rows from a local file: a JSON array of objects, a
//! single JSON object, or JSON Lines (one object per line). The table's
//! `url` names the file, optionally as a `file://` URL; relative paths are
//! resolved against the context's base directory.
//!
//! Arguments:
//! - `index`: list of column names identifying a row (default: none)

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{TransformContext, TransformError, TransformOutput};
use crate::models::Dataset;

/// Registry key of this transform
pub const KEY: &str = "json_records";

const FILE_SCHEME: &str = "file://";

/// Run the transform for one table
pub fn transform(ctx: &TransformContext) -> Result<TransformOutput, TransformError> {
    let path = source_path(ctx)?;
    let index = index_columns(&ctx.args)?;
    let records = parse_file(&path)?;

    tracing::debug!(
        table = %ctx.table_name,
        path = %path.display(),
        records = records.len(),
        "read json records"
    );

    let mut out = TransformOutput::new();
    out.insert(ctx.table_name.clone(), Dataset::from_records(index, records));
    Ok(out)
}

fn source_path(ctx: &TransformContext) -> Result<PathBuf, TransformError> {
    let location = ctx.url.trim();
    if location.is_empty() {
        return Err(TransformError::InvalidSource(format!(
            "no source configured for {} {}",
            ctx.collection, ctx.table_name
        )));
    }
    if location.contains("://") && !location.starts_with(FILE_SCHEME) {
        return Err(TransformError::InvalidSource(format!(
            "{} only reads local files: {}",
            KEY, location
        )));
    }

    let path = Path::new(location.strip_prefix(FILE_SCHEME).unwrap_or(location));
    Ok(match &ctx.base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    })
}

fn index_columns(args: &Map<String, Value>) -> Result<Vec<String>, TransformError> {
    match args.get("index") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(column)) => Ok(vec![column.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    TransformError::InvalidArgs(format!("index entries must be strings: {}", item))
                })
            })
            .collect(),
        Some(other) => Err(TransformError::InvalidArgs(format!(
            "index must be a list of column names: {}",
            other
        ))),
    }
}

fn into_record(path: &Path, record: usize, value: Value) -> Result<Map<String, Value>, TransformError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(TransformError::JsonParse {
            path: path.to_path_buf(),
            record,
            error: format!("expected an object, found {}", other),
        }),
    }
}

/// Parse a JSON file holding an array of objects or a single object
pub fn parse_json_file(path: &Path) -> Result<Vec<Map<String, Value>>, TransformError> {
    let content = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content).map_err(|e| TransformError::JsonParse {
        path: path.to_path_buf(),
        record: 0,
        error: e.to_string(),
    })?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| into_record(path, i, item))
            .collect(),
        other => Ok(vec![into_record(path, 0, other)?]),
    }
}

/// Parse a JSONL file (newline-delimited JSON objects)
pub fn parse_jsonl_file(path: &Path) -> Result<Vec<Map<String, Value>>, TransformError> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let value: Value =
            serde_json::from_str(trimmed).map_err(|e| TransformError::JsonParse {
                path: path.to_path_buf(),
                record: index,
                error: e.to_string(),
            })?;
        records.push(into_record(path, index, value)?);
    }

    Ok(records)
}

/// Parse a file based on its extension
pub fn parse_file(path: &Path) -> Result<Vec<Map<String, Value>>, TransformError> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match extension.to_lowercase().as_str() {
        "jsonl" | "ndjson" => parse_jsonl_file(path),
        "json" => parse_json_file(path),
        _ => {
            let content = fs::read_to_string(path)?;
            if content.trim_start().starts_with('[') {
                parse_json_file(path)
            } else {
                parse_jsonl_file(path)
            }
        }
    }
}
