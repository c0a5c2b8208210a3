//! Translate command implementation

use crate::catalog::LayerCatalog;
use crate::cli::{Backend, TranslateArgs};
use crate::output::OutputWriter;
use crate::output_types::{ExecutionOutput, StatementOutput, TranslateOutput};
use anyhow::{Context, Result};
use futures::TryStreamExt;
use geoquery_core::config::LayeredConfig;
use geoquery_core::models::{DatabaseProvider, FeatureRecord, SqlFragment};
use geoquery_query::{ExecutionOptions, FeatureQueryExecutor, RequestParams};
use geoquery_store::translate::SpatialMode;
use geoquery_store::{MemoryDataStore, StatementKind};
use std::path::Path;

pub async fn execute(
    args: TranslateArgs,
    layers: &Path,
    config: &LayeredConfig,
    output: &OutputWriter,
) -> Result<()> {
    let catalog = LayerCatalog::load(layers)?;
    let layer = catalog.layer(&args.layer)?;
    let service = config.service_policy()?;

    let params = RequestParams::from_assignments(&args.params)
        .context("Request parameters must be written as key=value")?;
    let query = FeatureQueryExecutor::<MemoryDataStore>::build_query(&params, layer, &service)?;

    let (provider, native_spatial) = backend(args.backend);
    let store = MemoryDataStore::new(provider).with_native_spatial(native_spatial);
    let executor = FeatureQueryExecutor::new(store.clone());
    let options = ExecutionOptions { include_count: args.count, timeout: service.query_timeout };
    let plan = executor.plan(&query, layer, &service, &options)?;

    let execution = if args.execute {
        let result = executor.execute(&query, layer, &service, options).await?;
        let features: Vec<FeatureRecord> = result.features.try_collect().await?;
        let statements = store
            .statements()
            .into_iter()
            .map(|recorded| StatementOutput {
                kind: match recorded.kind {
                    StatementKind::Count => "count".to_string(),
                    StatementKind::Query => "query".to_string(),
                },
                sql: recorded.statement.sql,
                params: recorded.statement.params.len(),
            })
            .collect();
        Some(ExecutionOutput { number_matched: result.number_matched, features: features.len(), statements })
    } else {
        None
    };

    let envelope_only = plan.mode == SpatialMode::EnvelopeOnly;
    if envelope_only {
        output.warning("Backend has no spatial SQL; spatial predicates reduced to bounding-box tests");
    }

    let result = TranslateOutput {
        layer: layer.name.clone(),
        backend: format!("{:?}", args.backend).to_lowercase(),
        envelope_only,
        limit: query.limit,
        offset: query.offset,
        count: plan.count,
        fetch: plan.fetch,
        execution,
    };

    if output.is_json() {
        return output.result(result);
    }

    output.kv("Layer", &result.layer);
    output.kv("Backend", &result.backend);
    output.kv("Page", format!("limit {} offset {}", result.limit, result.offset));
    if let Some(count) = &result.count {
        print_statement(output, "Count", count)?;
    }
    if let Some(fetch) = &result.fetch {
        print_statement(output, "Fetch", fetch)?;
    }
    if let Some(execution) = &result.execution {
        output.section("Recorded statements");
        for statement in &execution.statements {
            output.kv(&statement.kind, format!("{} parameter(s)", statement.params));
        }
        output.success(format!("{} statement(s) sent", execution.statements.len()));
    }
    Ok(())
}

fn backend(backend: Backend) -> (DatabaseProvider, bool) {
    match backend {
        Backend::Postgres => (DatabaseProvider::Postgres, true),
        Backend::Mysql => (DatabaseProvider::MySql, true),
        Backend::Sqlserver => (DatabaseProvider::SqlServer, true),
        Backend::Spatialite => (DatabaseProvider::Sqlite, true),
        Backend::Sqlite => (DatabaseProvider::Sqlite, false),
    }
}

fn print_statement(output: &OutputWriter, title: &str, statement: &SqlFragment) -> Result<()> {
    output.section(title);
    output.code(&statement.sql);
    if !statement.params.is_empty() {
        output.data(&statement.params)?;
    }
    Ok(())
}
