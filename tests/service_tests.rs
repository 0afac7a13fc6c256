//! End-to-end tests: ingest, stage and read through the service facade

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{NaiveDate, NaiveDateTime};
use queens::models::{ColumnDef, Dataset, SqlType};
use queens::{ServiceConfig, StatsService, TableConfig, TransformContext, TransformRegistry};
use serde_json::{Map, Value, json};

fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

fn record(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn config() -> ServiceConfig {
    ServiceConfig::new().with_collection(
        "dukes",
        vec![
            ColumnDef::new("year", SqlType::Integer, false),
            ColumnDef::new("fuel", SqlType::Text, true),
            ColumnDef::new("unit", SqlType::Text, true),
            ColumnDef::new("value", SqlType::Real, true),
        ],
        [
            (
                "1.1".to_string(),
                TableConfig::new("growing", "mem://1.1").with_description("Commodity balances"),
            ),
            ("1.2".to_string(), TableConfig::new("broken", "mem://1.2")),
        ],
    )
}

/// `growing` yields 10 rows on its first run and two more on every later run;
/// `broken` yields a column the collection does not declare.
fn registry() -> TransformRegistry {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = TransformRegistry::new();

    registry.register("growing", move |ctx: &TransformContext| {
        let n = 10 + 2 * calls.fetch_add(1, Ordering::SeqCst);
        let records = (0..n)
            .map(|i| {
                record(json!({
                    "year": 2000 + i as i64,
                    "fuel": if i % 2 == 0 { "Coal" } else { "Natural gas" },
                    "value": i as f64 * 1.5,
                }))
            })
            .collect();
        let mut out = BTreeMap::new();
        out.insert(
            ctx.table_name.clone(),
            Dataset::from_records(vec!["year".to_string()], records),
        );
        Ok(out)
    });

    registry.register("broken", |ctx: &TransformContext| {
        let mut out = BTreeMap::new();
        out.insert(
            ctx.table_name.clone(),
            Dataset::from_records(
                vec![],
                vec![record(json!({"year": 2020, "colour": "red"}))],
            ),
        );
        Ok(out)
    });

    registry
}

fn service() -> StatsService {
    StatsService::in_memory(config())
        .unwrap()
        .with_registry(registry())
}

fn only(table: &str) -> Vec<String> {
    vec![table.to_string()]
}

fn years(service: &StatsService, filters: Option<&str>) -> Vec<i64> {
    let page = service
        .query("dukes", "1.1", filters, Some(100), None)
        .unwrap();
    page.data
        .iter()
        .map(|row| row["year"].as_i64().unwrap())
        .collect()
}

#[test]
fn test_staging_selects_version_as_of_date() {
    let service = service();
    let tables = only("1.1");

    let first = service
        .ingest_at("dukes", Some(&tables), at(2024, 1, 10, 8))
        .unwrap();
    assert_eq!(first.records_ingested, 10);
    let second = service
        .ingest_at("dukes", Some(&tables), at(2024, 2, 10, 8))
        .unwrap();
    assert_eq!(second.records_ingested, 12);

    let report = service.stage("dukes", date(2024, 1, 31)).unwrap();
    assert_eq!(report.rows, 10);
    assert_eq!(years(&service, None).len(), 10);

    let report = service.stage("dukes", date(2024, 2, 10)).unwrap();
    assert_eq!(report.rows, 12);
    assert_eq!(report.tables, 1);
    assert_eq!(years(&service, None).len(), 12);

    let report = service.stage("dukes", date(2023, 12, 31)).unwrap();
    assert_eq!(report.rows, 0);
    assert!(years(&service, None).is_empty());
}

#[test]
fn test_staging_is_idempotent() {
    let service = service();
    service
        .ingest_at("dukes", Some(&only("1.1")), at(2024, 1, 10, 8))
        .unwrap();

    service.stage("dukes", date(2024, 1, 31)).unwrap();
    let page = service.query("dukes", "1.1", None, None, None).unwrap();
    let metadata = service.metadata("dukes", "1.1").unwrap();

    service.stage("dukes", date(2024, 1, 31)).unwrap();
    assert_eq!(service.query("dukes", "1.1", None, None, None).unwrap(), page);
    assert_eq!(service.metadata("dukes", "1.1").unwrap(), metadata);
}

#[test]
fn test_failed_table_does_not_block_siblings() {
    let service = service();
    let report = service
        .ingest_at("dukes", None, at(2024, 1, 10, 8))
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.tables_ingested, 1);
    assert_eq!(report.tables_failed, 1);
    assert!(report.errors[0].contains("colour"));

    // 1.2 is logged right after 1.1 but never marked successful
    let ok_id = report.ingest_ids["1.1"];
    let failed = service.backend().ingest_record(ok_id + 1).unwrap().unwrap();
    assert_eq!(failed.table_name, "1.2");
    assert!(!failed.success);

    let versions = service.versions("dukes", None).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].table_name, "1.1");

    service.stage("dukes", date(2024, 1, 31)).unwrap();
    let summary = service.staged_summary("dukes", None).unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].table_name, "1.1");
    assert_eq!(summary[0].row_count, 10);
    assert_eq!(summary[0].min_year, Some(json!(2000)));
    assert_eq!(summary[0].max_year, Some(json!(2009)));

    let page = service.query("dukes", "1.2", None, None, None).unwrap();
    assert!(page.data.is_empty());
}

#[test]
fn test_cursor_pagination_covers_every_row_once() {
    let service = service();
    service
        .ingest_at("dukes", Some(&only("1.1")), at(2024, 1, 10, 8))
        .unwrap();
    service.stage("dukes", date(2024, 1, 31)).unwrap();

    let mut seen = Vec::new();
    let mut sizes = Vec::new();
    let mut cursor = None;
    loop {
        let page = service
            .query("dukes", "1.1", None, Some(4), cursor)
            .unwrap();
        sizes.push(page.data.len());
        seen.extend(page.data.iter().map(|row| row["year"].as_i64().unwrap()));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(seen, (2000..2010).collect::<Vec<i64>>());
}

#[test]
fn test_query_page_shape() {
    let service = service();
    service
        .ingest_at("dukes", Some(&only("1.1")), at(2024, 1, 10, 8))
        .unwrap();
    service.stage("dukes", date(2024, 1, 31)).unwrap();

    let page = service.query("dukes", "1.1", None, Some(3), None).unwrap();
    assert_eq!(page.table_description.as_deref(), Some("Commodity balances"));
    assert!(page.next_cursor.is_some());

    let columns: Vec<&str> = page.data[0].keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["table_name", "year", "fuel", "value"]);
}

#[test]
fn test_filters_select_matching_rows() {
    let service = service();
    service
        .ingest_at("dukes", Some(&only("1.1")), at(2024, 1, 10, 8))
        .unwrap();
    service.stage("dukes", date(2024, 1, 31)).unwrap();

    assert_eq!(
        years(&service, Some(r#"{"year": {"gt": 2005}, "fuel": "Coal"}"#)),
        vec![2006, 2008]
    );
    assert_eq!(
        years(
            &service,
            Some(r#"{"$or": [{"fuel": "Coal"}, {"year": {"lte": 2001}}]}"#)
        ),
        vec![2000, 2001, 2002, 2004, 2006, 2008]
    );
    assert_eq!(
        years(&service, Some(r#"{"fuel": {"like": "%gas%"}, "year": {"lt": "2004"}}"#)),
        vec![2001, 2003]
    );
    assert_eq!(
        years(&service, Some(r#"{"value": {"gte": 12}}"#)),
        vec![2008, 2009]
    );
    assert_eq!(years(&service, Some("")).len(), 10);
}

#[test]
fn test_filter_errors_map_to_status_codes() {
    let service = service();
    service
        .ingest_at("dukes", Some(&only("1.1")), at(2024, 1, 10, 8))
        .unwrap();
    service.stage("dukes", date(2024, 1, 31)).unwrap();

    let status = |filters: &str| {
        service
            .query("dukes", "1.1", Some(filters), None, None)
            .unwrap_err()
            .status_code()
    };

    assert_eq!(status("{not json"), 400);
    assert_eq!(status(r#"{"fuel": []}"#), 400);
    assert_eq!(status(r#"{"colour": "red"}"#), 422);
    assert_eq!(status(r#"{"table_name": "1.2"}"#), 422);
    // declared but null in every row of 1.1
    assert_eq!(status(r#"{"unit": "ktoe"}"#), 422);
    assert_eq!(status(r#"{"fuel": {"gt": "Coal"}}"#), 422);
    assert_eq!(status(r#"{"year": {"gt": "recent"}}"#), 422);
    assert_eq!(status(r#"{"year": {"between": [1, 2]}}"#), 422);
}

#[test]
fn test_metadata_lists_queryable_columns() {
    let service = service();
    service
        .ingest_at("dukes", Some(&only("1.1")), at(2024, 1, 10, 8))
        .unwrap();

    assert!(service.metadata("dukes", "1.1").unwrap().is_empty());
    assert_eq!(service.metadata("dukes", "9.9").unwrap_err().status_code(), 404);

    service.stage("dukes", date(2024, 1, 31)).unwrap();
    let metadata = service.metadata("dukes", "1.1").unwrap();

    let columns: Vec<&str> = metadata.iter().map(|m| m.column_name.as_str()).collect();
    assert_eq!(columns, vec!["table_name", "year", "fuel", "value"]);

    let fuel = metadata.iter().find(|m| m.column_name == "fuel").unwrap();
    assert_eq!(fuel.n_non_null, 10);
    assert_eq!(fuel.n_unique, 2);
    assert_eq!(fuel.dtype, SqlType::Text);

    let year = metadata.iter().find(|m| m.column_name == "year").unwrap();
    assert_eq!(year.n_unique, 10);
    assert_eq!(year.dtype, SqlType::Integer);
}

#[test]
fn test_filters_follow_restaged_snapshot() {
    let service = service();
    service
        .ingest_at("dukes", Some(&only("1.1")), at(2024, 1, 10, 8))
        .unwrap();
    service.stage("dukes", date(2024, 1, 31)).unwrap();
    assert_eq!(years(&service, Some(r#"{"fuel": "Coal"}"#)).len(), 5);

    // nothing was ingested by this cutoff, so fuel is no longer queryable
    service.stage("dukes", date(2023, 12, 31)).unwrap();
    let err = service
        .query("dukes", "1.1", Some(r#"{"fuel": "Coal"}"#), None, None)
        .unwrap_err();
    assert_eq!(err.status_code(), 422);
    assert!(years(&service, None).is_empty());
}
