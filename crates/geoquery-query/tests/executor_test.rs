//! End-to-end request handling against the recording data store

use futures::TryStreamExt;
use geoquery_core::error::{ErrorKind, UnsupportedReason};
use geoquery_core::models::{
    BoundingBox, Crs, DatabaseProvider, FeatureRecord, FieldCatalog, FieldDefinition, FieldType,
    FilterExpression, LayerPolicy, LogicalOperator, ResultType, ServicePolicy, SpatialFallback,
    SpatialPredicate,
};
use geoquery_query::{ExecutionOptions, FeatureQueryExecutor, RequestParams};
use geoquery_store::translate::SpatialMode;
use geoquery_store::{MemoryDataStore, StatementKind};
use std::collections::HashMap;
use std::time::Duration;

fn layer() -> LayerPolicy {
    let catalog = FieldCatalog::new(vec![
        FieldDefinition::new("id", FieldType::Integer),
        FieldDefinition::new("status", FieldType::String),
        FieldDefinition::new("opened", FieldType::DateTime),
        FieldDefinition::geometry("geom", Crs::wgs84()),
    ])
    .with_primary_key("id");
    let mut layer = LayerPolicy::new("incidents", "incidents", catalog);
    layer.temporal_field = Some("opened".into());
    layer
}

fn record(id: i64) -> FeatureRecord {
    FeatureRecord::new(HashMap::new()).with_id(serde_json::json!(id))
}

#[tokio::test]
async fn test_hits_issues_one_count_and_no_fetch() {
    let (layer, service) = (layer(), ServicePolicy::default());
    let params = RequestParams::new().with("resultType", "hits").with("filter", "status='closed'");
    let query = FeatureQueryExecutor::<MemoryDataStore>::build_query(&params, &layer, &service).unwrap();

    let store = MemoryDataStore::default().with_count(7);
    let executor = FeatureQueryExecutor::new(store.clone());
    let result = executor.execute(&query, &layer, &service, ExecutionOptions::default()).await.unwrap();

    assert_eq!(result.number_matched, Some(7));
    let rows: Vec<FeatureRecord> = result.features.try_collect().await.unwrap();
    assert!(rows.is_empty());
    assert_eq!(store.count_of(StatementKind::Count), 1);
    assert_eq!(store.count_of(StatementKind::Query), 0);
    assert!(store.statements()[0].statement.sql.contains("WHERE \"status\" = $1"));
}

#[tokio::test]
async fn test_results_stream_one_fetch() {
    let (layer, service) = (layer(), ServicePolicy::default());
    let query = FeatureQueryExecutor::<MemoryDataStore>::build_query(&RequestParams::new(), &layer, &service).unwrap();

    let store = MemoryDataStore::default().with_records(vec![record(1), record(2), record(3)]);
    let executor = FeatureQueryExecutor::new(store.clone());
    let options = ExecutionOptions { include_count: true, ..Default::default() };
    let result = executor.execute(&query, &layer, &service, options).await.unwrap();

    let rows: Vec<FeatureRecord> = result.features.try_collect().await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(result.number_matched, Some(3));
    assert_eq!(store.count_of(StatementKind::Query), 1);
    assert_eq!(store.count_of(StatementKind::Count), 1);
}

#[test]
fn test_bbox_datetime_and_filter_share_one_and() {
    let (layer, service) = (layer(), ServicePolicy::default());
    let params = RequestParams::new()
        .with("bbox", "-10,40,10,60")
        .with("datetime", "2024-01-01T00:00:00Z/..")
        .with("filter", "status = 'open'")
        .with("limit", "25");

    let query = FeatureQueryExecutor::<MemoryDataStore>::build_query(&params, &layer, &service).unwrap();

    assert_eq!(query.limit, 25);
    assert_eq!(query.bbox, Some(BoundingBox::new(-10.0, 40.0, 10.0, 60.0).unwrap()));
    let Some(FilterExpression::Logical { operator: LogicalOperator::And, operands }) = &query.filter else {
        panic!("expected a conjunction, got {:?}", query.filter);
    };
    assert_eq!(operands.len(), 3);
    assert!(matches!(&operands[0], FilterExpression::Spatial(s) if s.predicate == SpatialPredicate::BBox && s.field == "geom"));
    assert!(matches!(&operands[1], FilterExpression::Comparison { field, .. } if field == "opened"));
}

#[tokio::test]
async fn test_translation_failure_sends_nothing() {
    let (layer, service) = (layer(), ServicePolicy::default());
    let params = RequestParams::new()
        .with("filter", "RELATE(geom, POLYGON((0 0, 1 0, 1 1, 0 1, 0 0)), 'T*F**F***')");
    let query = FeatureQueryExecutor::<MemoryDataStore>::build_query(&params, &layer, &service).unwrap();

    let store = MemoryDataStore::new(DatabaseProvider::MySql);
    let executor = FeatureQueryExecutor::new(store.clone());
    let options = ExecutionOptions { include_count: true, ..Default::default() };
    let err = executor.execute(&query, &layer, &service, options).await.err().unwrap();

    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert_eq!(err.unsupported_reason(), Some(UnsupportedReason::De9imUnavailable));
    assert!(store.statements().is_empty());
}

#[tokio::test]
async fn test_missing_spatial_sql_follows_fallback_policy() {
    let layer = layer();
    let params = RequestParams::new().with("bbox", "0,0,1,1");
    let store = MemoryDataStore::new(DatabaseProvider::Sqlite).with_native_spatial(false);
    let executor = FeatureQueryExecutor::new(store.clone());

    let reject = ServicePolicy::default();
    let query = FeatureQueryExecutor::<MemoryDataStore>::build_query(&params, &layer, &reject).unwrap();
    let err = executor.execute(&query, &layer, &reject, ExecutionOptions::default()).await.err().unwrap();
    assert_eq!(err.unsupported_reason(), Some(UnsupportedReason::NativeSpatialUnavailable));
    assert!(store.statements().is_empty());

    let fallback = ServicePolicy { spatial_fallback: SpatialFallback::BoundingBoxOnly, ..ServicePolicy::default() };
    let plan = executor.plan(&query, &layer, &fallback, &ExecutionOptions::default()).unwrap();
    assert_eq!(plan.mode, SpatialMode::EnvelopeOnly);

    executor.execute(&query, &layer, &fallback, ExecutionOptions::default()).await.unwrap();
    let statements = store.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].statement.sql.contains("\"rtree_incidents_geom\""));
}

#[tokio::test]
async fn test_deadline_surfaces_timeout() {
    let (layer, service) = (layer(), ServicePolicy::default());
    let query = FeatureQueryExecutor::<MemoryDataStore>::build_query(&RequestParams::new(), &layer, &service).unwrap();

    let store = MemoryDataStore::default().with_latency(Duration::from_secs(5));
    let executor = FeatureQueryExecutor::new(store);
    let options = ExecutionOptions { timeout: Some(Duration::from_millis(20)), ..Default::default() };
    let err = executor.execute(&query, &layer, &service, options).await.err().unwrap();

    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[test]
fn test_request_errors_are_structured() {
    let (layer, service) = (layer(), ServicePolicy::default());
    let build = |params: RequestParams| FeatureQueryExecutor::<MemoryDataStore>::build_query(&params, &layer, &service);

    assert_eq!(build(RequestParams::new().with("limit", "-5")).unwrap_err().kind(), ErrorKind::Limit);
    assert_eq!(build(RequestParams::new().with("bbox", "1,2,3")).unwrap_err().kind(), ErrorKind::Parse);
    assert_eq!(build(RequestParams::new().with("sortby", "geom")).unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(build(RequestParams::new().with("filter", "status = ")).unwrap_err().kind(), ErrorKind::Parse);

    let hits = build(RequestParams::new().with("resultType", "HITS")).unwrap();
    assert_eq!(hits.result_type, ResultType::Hits);
}
