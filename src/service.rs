//! Service facade
//!
//! [`StatsService`] ties configuration, transforms and the store together
//! and exposes the operations callers use: `ingest`, `stage`, `query` and
//! `metadata`, plus the read-only `versions` and `staged_summary`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ServiceConfig};
use crate::database::{DuckDBBackend, ReadRequest, StageReport};
use crate::error::{ServiceError, ServiceResult};
use crate::filter::build_filter;
use crate::models::{
    CollectionSchema, ColumnMetadata, IngestRecord, QueryResponse, StagedTableSummary,
    TypedDataset, end_of_day, format_ingest_ts,
};
use crate::transform::{
    ConfiguredSources, SourceResolver, TransformContext, TransformError, TransformFn,
    TransformRegistry,
};
use crate::validation::validate_dataset;

/// Errors kept in an [`IngestReport`]
const MAX_REPORTED_ERRORS: usize = 100;

/// Outcome of an ingest run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub collection: String,
    /// Timestamp shared by every table of the run
    pub ingest_ts: String,
    pub tables_ingested: usize,
    pub tables_failed: usize,
    pub records_ingested: usize,
    /// Ingest id of every successfully written table
    pub ingest_ids: BTreeMap<String, i64>,
    pub errors_count: usize,
    /// First errors of the run
    pub errors: Vec<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl IngestReport {
    fn new(collection: &str, ingest_ts: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ingest_ts: ingest_ts.to_string(),
            ..Self::default()
        }
    }

    /// Record a failed table
    pub fn add_failure(&mut self, table_name: &str, error: &ServiceError) {
        tracing::warn!(
            collection = %self.collection,
            table = table_name,
            error = %error,
            "table ingest failed"
        );
        self.tables_failed += 1;
        self.errors_count += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(format!("{}: {}", table_name, error));
        }
    }

    pub fn is_success(&self) -> bool {
        self.tables_failed == 0
    }

    /// Format duration as human-readable string
    pub fn duration_string(&self) -> String {
        let millis = self.duration.as_millis();
        if millis < 1000 {
            format!("{}ms", millis)
        } else {
            let secs = self.duration.as_secs();
            if secs < 60 {
                format!("{}s", secs)
            } else {
                format!("{}m {}s", secs / 60, secs % 60)
            }
        }
    }
}

/// One table of an ingest run, registered and ready to transform
struct IngestJob {
    table_name: String,
    ingest_id: i64,
    url: String,
    transform: TransformFn,
    context: TransformContext,
}

fn run_job(schema: &CollectionSchema, job: &IngestJob) -> ServiceResult<TypedDataset> {
    let mut output = (job.transform)(&job.context)?;
    let dataset = output
        .remove(&job.table_name)
        .ok_or_else(|| TransformError::MissingTable(job.table_name.clone()))?;
    Ok(validate_dataset(schema, &job.table_name, &dataset)?)
}

/// The statistics service
pub struct StatsService {
    config: ServiceConfig,
    schemas: BTreeMap<String, CollectionSchema>,
    backend: DuckDBBackend,
    registry: TransformRegistry,
    sources: Box<dyn SourceResolver>,
    base_dir: Option<PathBuf>,
}

impl StatsService {
    /// Build a service over an open store, creating any missing relations
    pub fn new(config: ServiceConfig, backend: DuckDBBackend) -> ServiceResult<Self> {
        config.validate()?;
        let schemas = config.schemas();

        backend.initialize()?;
        for schema in schemas.values() {
            backend.ensure_collection(schema)?;
        }

        Ok(Self {
            sources: Box::new(ConfiguredSources::new(config.clone())),
            config,
            schemas,
            backend,
            registry: TransformRegistry::with_builtins(),
            base_dir: None,
        })
    }

    /// Service over a throwaway in-memory store
    pub fn in_memory(config: ServiceConfig) -> ServiceResult<Self> {
        Self::new(config, DuckDBBackend::in_memory()?)
    }

    /// Load `queens.toml` from a directory and open its store
    pub fn open(dir: &Path) -> ServiceResult<Self> {
        let config = ServiceConfig::load(dir)?;
        let backend = DuckDBBackend::new(config.db_path(dir))?;
        tracing::info!(path = %config.db_path(dir).display(), "opened store");
        Ok(Self::new(config, backend)?.with_base_dir(dir))
    }

    pub fn with_registry(mut self, registry: TransformRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_sources(mut self, sources: impl SourceResolver + 'static) -> Self {
        self.sources = Box::new(sources);
        self
    }

    /// Directory relative transform sources are resolved against
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn backend(&self) -> &DuckDBBackend {
        &self.backend
    }

    /// Static schema of a collection
    pub fn schema(&self, collection: &str) -> ServiceResult<&CollectionSchema> {
        self.schemas
            .get(collection)
            .ok_or_else(|| ConfigError::UnknownCollection(collection.to_string()).into())
    }

    /// Page size for a request: the default when absent, clamped to the maximum
    pub fn clamp_limit(&self, limit: Option<usize>) -> usize {
        limit
            .unwrap_or(self.config.api.default_limit)
            .clamp(1, self.config.api.max_limit)
    }

    /// Ingest tables of a collection; every configured table when `tables`
    /// is `None`
    pub fn ingest(
        &self,
        collection: &str,
        tables: Option<&[String]>,
    ) -> ServiceResult<IngestReport> {
        self.ingest_at(collection, tables, Utc::now().naive_utc())
    }

    /// Ingest with an explicit timestamp shared by every table of the run
    pub fn ingest_at(
        &self,
        collection: &str,
        tables: Option<&[String]>,
        ingest_ts: NaiveDateTime,
    ) -> ServiceResult<IngestReport> {
        let start = Instant::now();
        let schema = self.schema(collection)?;
        let collection_config = self.config.collection(collection)?;
        let ingest_ts = format_ingest_ts(ingest_ts);
        let mut report = IngestReport::new(collection, &ingest_ts);

        let table_names: Vec<String> = match tables {
            Some(tables) => tables.to_vec(),
            None => collection_config.tables.keys().cloned().collect(),
        };

        tracing::info!(collection, tables = table_names.len(), ingest_ts = %ingest_ts, "ingest started");

        let mut jobs = Vec::with_capacity(table_names.len());
        for table_name in table_names {
            match self.register_job(collection, &table_name, &ingest_ts) {
                Ok(job) => jobs.push(job),
                Err(e) => report.add_failure(&table_name, &e),
            }
        }

        let results: Vec<ServiceResult<TypedDataset>> =
            jobs.par_iter().map(|job| run_job(schema, job)).collect();

        for (job, result) in jobs.iter().zip(results) {
            let written = result.and_then(|typed| {
                Ok(self.backend.write_batch(schema, job.ingest_id, &typed)?)
            });
            match written {
                Ok(rows) => {
                    tracing::debug!(table = %job.table_name, ingest_id = job.ingest_id, rows, url = %job.url, "table ingested");
                    report.tables_ingested += 1;
                    report.records_ingested += rows;
                    report.ingest_ids.insert(job.table_name.clone(), job.ingest_id);
                }
                Err(e) => report.add_failure(&job.table_name, &e),
            }
        }

        report.duration = start.elapsed();
        tracing::info!(
            collection,
            ingested = report.tables_ingested,
            failed = report.tables_failed,
            records = report.records_ingested,
            "ingest finished in {}",
            report.duration_string()
        );
        Ok(report)
    }

    /// Resolve a table's transform and source, then log the attempt
    fn register_job(
        &self,
        collection: &str,
        table_name: &str,
        ingest_ts: &str,
    ) -> ServiceResult<IngestJob> {
        let table = self.config.table(collection, table_name)?;
        let transform = self
            .registry
            .resolve(collection, table_name, &table.transform)?;
        let url = self.sources.resolve(collection, table_name)?;

        let ingest_id = self
            .backend
            .append_ingest(collection, table_name, &url, ingest_ts)?;

        let mut context =
            TransformContext::new(collection, table_name, url.clone()).with_args(table.args.clone());
        if let Some(dir) = &self.base_dir {
            context = context.with_base_dir(dir);
        }

        Ok(IngestJob {
            table_name: table_name.to_string(),
            ingest_id,
            url,
            transform,
            context,
        })
    }

    /// Rebuild a collection's production relation as of the end of
    /// `as_of_date`, or as of now
    pub fn stage(
        &self,
        collection: &str,
        as_of_date: Option<NaiveDate>,
    ) -> ServiceResult<StageReport> {
        let cutoff = match as_of_date {
            Some(date) => end_of_day(date),
            None => Utc::now().naive_utc(),
        };
        self.stage_at(collection, cutoff)
    }

    /// Rebuild a collection's production relation as of `cutoff`
    pub fn stage_at(&self, collection: &str, cutoff: NaiveDateTime) -> ServiceResult<StageReport> {
        let schema = self.schema(collection)?;
        let descriptions: Vec<(String, Option<String>)> = self
            .config
            .collection(collection)?
            .tables
            .iter()
            .map(|(name, table)| (name.clone(), table.description.clone()))
            .collect();

        let cutoff = format_ingest_ts(cutoff);
        self.backend
            .stage(schema, &descriptions, &cutoff)
            .map_err(|e| {
                tracing::error!(collection, cutoff = %cutoff, error = %e, "staging failed");
                e.into()
            })
    }

    /// Queryable columns of a staged table
    pub fn metadata(&self, collection: &str, table_name: &str) -> ServiceResult<Vec<ColumnMetadata>> {
        self.schema(collection)?;
        let metadata = self.backend.table_metadata(collection, table_name)?;
        if metadata.is_empty() {
            self.config.table(collection, table_name)?;
        }
        Ok(metadata)
    }

    /// One page of a table's production rows matching `filters`
    ///
    /// The filter is validated against the same staged snapshot the page is
    /// read from.
    pub fn query(
        &self,
        collection: &str,
        table_name: &str,
        filters: Option<&str>,
        limit: Option<usize>,
        cursor: Option<i64>,
    ) -> ServiceResult<QueryResponse> {
        let schema = self.schema(collection)?;
        let limit = self.clamp_limit(limit);

        self.backend
            .read_snapshot(schema, table_name, |metadata| -> ServiceResult<ReadRequest> {
                if metadata.is_empty() {
                    self.config.table(collection, table_name)?;
                }

                let compiled = build_filter(schema, table_name, metadata, filters)?;
                tracing::debug!(
                    collection,
                    table = table_name,
                    where_sql = %compiled.where_sql,
                    params = compiled.params.len(),
                    "compiled filter"
                );

                Ok(ReadRequest::new(compiled.where_sql, compiled.params, limit)
                    .with_cursor(cursor))
            })
    }

    /// Successful ingest versions, by table then newest first
    pub fn versions(
        &self,
        collection: &str,
        table_name: Option<&str>,
    ) -> ServiceResult<Vec<IngestRecord>> {
        self.schema(collection)?;
        Ok(self.backend.ingest_versions(collection, table_name)?)
    }

    /// Tables in production with their version, size and year range
    pub fn staged_summary(
        &self,
        collection: &str,
        table_name: Option<&str>,
    ) -> ServiceResult<Vec<StagedTableSummary>> {
        let schema = self.schema(collection)?;
        Ok(self.backend.staged_summary(schema, table_name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::models::{ColumnDef, Dataset, SqlType};
    use serde_json::json;

    fn config() -> ServiceConfig {
        ServiceConfig::new().with_collection(
            "dukes",
            vec![
                ColumnDef::new("year", SqlType::Integer, false),
                ColumnDef::new("value", SqlType::Real, true),
            ],
            [
                ("1.1".to_string(), TableConfig::new("fixed", "src/1.1")),
                ("1.2".to_string(), TableConfig::new("missing", "src/1.2")),
            ],
        )
    }

    fn registry() -> TransformRegistry {
        let mut registry = TransformRegistry::new();
        registry.register("fixed", |ctx: &TransformContext| {
            let records = (2020..2023)
                .map(|y| json!({"year": y, "value": y as f64 / 2.0}).as_object().cloned().unwrap())
                .collect();
            let mut out = BTreeMap::new();
            out.insert(
                ctx.table_name.clone(),
                Dataset::from_records(vec!["year".to_string()], records),
            );
            Ok(out)
        });
        registry
    }

    #[test]
    fn test_clamp_limit() {
        let service = StatsService::in_memory(config()).unwrap();
        assert_eq!(service.clamp_limit(None), 1000);
        assert_eq!(service.clamp_limit(Some(0)), 1);
        assert_eq!(service.clamp_limit(Some(10_000)), 5000);
        assert_eq!(service.clamp_limit(Some(20)), 20);
    }

    #[test]
    fn test_unknown_transform_is_reported_per_table() {
        let service = StatsService::in_memory(config())
            .unwrap()
            .with_registry(registry());
        let report = service.ingest("dukes", None).unwrap();

        assert_eq!(report.tables_ingested, 1);
        assert_eq!(report.tables_failed, 1);
        assert_eq!(report.records_ingested, 3);
        assert!(report.errors[0].starts_with("1.2"));
        assert!(report.ingest_ids.contains_key("1.1"));
    }

    #[test]
    fn test_unknown_collection() {
        let service = StatsService::in_memory(config()).unwrap();
        let err = service.ingest("trends", None).unwrap_err();
        assert_eq!(err.status_code(), 404);
        let err = service.query("trends", "1.1", None, None, None).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_unknown_table_query() {
        let service = StatsService::in_memory(config()).unwrap();
        let err = service.query("dukes", "9.9", None, None, None).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_unstaged_table_reads_empty() {
        let service = StatsService::in_memory(config()).unwrap();
        let page = service.query("dukes", "1.1", None, None, None).unwrap();
        assert!(page.data.is_empty());
        assert!(page.next_cursor.is_none());
    }
}
