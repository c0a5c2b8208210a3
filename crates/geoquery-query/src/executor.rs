//! Feature query execution
//!
//! One request becomes one [`FeatureQuery`], at most one count statement and
//! at most one streaming fetch. Everything that can fail without I/O fails
//! before the first statement is sent.

use crate::constraints::QueryConstraintResolver;
use crate::params::{self, RequestParams};
use futures::stream;
use geoquery_core::error::{GeoqueryError, Result, UnsupportedReason};
use geoquery_core::models::{
    ComparisonOperator, Crs, FeatureQuery, FilterExpression, Geometry, LayerPolicy, Literal,
    ResultType, ServicePolicy, SpatialFallback, SpatialFilter, SpatialPredicate, SqlFragment,
    TemporalInterval,
};
use geoquery_core::ports::{FeatureDataStore, FeatureStream};
use geoquery_filter::{parse_filter, FilterContext};
use geoquery_geo::GeometryParser;
use geoquery_store::translate::{backend_for, SpatialMode};
use geoquery_store::StatementBuilder;
use std::time::Duration;

/// Per-call execution switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Run the count statement even for `results` requests (`numberMatched`)
    pub include_count: bool,
    /// Deadline for the count and for opening the fetch stream; falls back
    /// to the service's `query_timeout`
    pub timeout: Option<Duration>,
}

/// Statements prepared for one query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub count: Option<SqlFragment>,
    pub fetch: Option<SqlFragment>,
    pub mode: SpatialMode,
}

/// Outcome of [`FeatureQueryExecutor::execute`]
pub struct FeatureQueryResult {
    pub number_matched: Option<u64>,
    pub features: FeatureStream,
}

/// Runs feature queries against a data store
pub struct FeatureQueryExecutor<S: FeatureDataStore> {
    store: S,
}

impl<S: FeatureDataStore> FeatureQueryExecutor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve constraints, parse the filter and fold bbox and datetime
    /// into it, producing the request's single [`FeatureQuery`]
    pub fn build_query(
        params: &RequestParams,
        layer: &LayerPolicy,
        service: &ServicePolicy,
    ) -> Result<FeatureQuery> {
        let constraints = QueryConstraintResolver::new(layer, service).resolve(params)?;

        let filter_crs = params.first(params::FILTER_CRS).map(Crs::parse).transpose()?;
        let geometry = GeometryParser::from_policy(service).with_default_crs(filter_crs.or(service.default_crs));

        let filter = match params.first(params::FILTER) {
            Some(raw) => {
                let ctx = FilterContext::from_policy(&layer.catalog, &geometry, service);
                parse_filter(raw, params.first(params::FILTER_LANG), &ctx)?
            }
            None => None,
        };

        let mut operands = Vec::with_capacity(3);
        if let Some(bbox) = &constraints.bbox {
            let field = layer.catalog.geometry_field().ok_or_else(|| {
                GeoqueryError::field_validation("bbox", format!("Layer '{}' has no geometry field", layer.name))
            })?;
            let envelope = geometry.accept(Geometry::envelope(bbox, Crs::wgs84()))?.geometry;
            operands.push(FilterExpression::Spatial(SpatialFilter::new(
                SpatialPredicate::BBox,
                field.name.clone(),
                envelope,
            )));
        }
        if let (Some(interval), Some(field)) = (&constraints.temporal, &layer.temporal_field) {
            operands.push(temporal_filter(field, interval));
        }
        operands.extend(filter);

        Ok(FeatureQuery {
            limit: constraints.limit,
            offset: constraints.offset,
            bbox: constraints.bbox,
            temporal: constraints.temporal,
            result_type: constraints.result_type,
            property_names: constraints.property_names,
            sort: constraints.sort,
            filter: FilterExpression::and(operands),
            output_crs: constraints.output_crs,
            include_geometry: constraints.include_geometry,
        })
    }

    /// Translate `query` for this store's backend
    ///
    /// A missing spatial capability is retried in envelope-only mode when the
    /// service allows it.
    pub fn plan(
        &self,
        query: &FeatureQuery,
        layer: &LayerPolicy,
        service: &ServicePolicy,
        options: &ExecutionOptions,
    ) -> Result<QueryPlan> {
        match self.plan_in(query, layer, options, SpatialMode::Native) {
            Err(e) if e.unsupported_reason() == Some(UnsupportedReason::NativeSpatialUnavailable) => {
                match service.spatial_fallback {
                    SpatialFallback::Reject => Err(e),
                    SpatialFallback::BoundingBoxOnly => {
                        tracing::warn!(
                            layer = %layer.name,
                            backend = self.store.provider().name(),
                            "No native spatial SQL, falling back to envelope-only filtering"
                        );
                        self.plan_in(query, layer, options, SpatialMode::EnvelopeOnly)
                    }
                }
            }
            other => other,
        }
    }

    fn plan_in(
        &self,
        query: &FeatureQuery,
        layer: &LayerPolicy,
        options: &ExecutionOptions,
        mode: SpatialMode,
    ) -> Result<QueryPlan> {
        let backend = backend_for(self.store.provider(), self.store.has_native_spatial());
        let builder = StatementBuilder::new(backend.as_ref(), layer).with_mode(mode);
        let hits = query.result_type == ResultType::Hits;

        let count = if hits || options.include_count { Some(builder.count(query)?) } else { None };
        let fetch = if hits { None } else { Some(builder.fetch(query)?) };
        Ok(QueryPlan { count, fetch, mode })
    }

    /// Run a query; a `hits` request issues only the count statement
    pub async fn execute(
        &self,
        query: &FeatureQuery,
        layer: &LayerPolicy,
        service: &ServicePolicy,
        options: ExecutionOptions,
    ) -> Result<FeatureQueryResult> {
        let plan = self.plan(query, layer, service, &options)?;

        tracing::info!(
            layer = %layer.name,
            backend = self.store.provider().name(),
            result_type = ?query.result_type,
            count = plan.count.is_some(),
            envelope_only = plan.mode == SpatialMode::EnvelopeOnly,
            "Executing feature query"
        );

        let work = async {
            let number_matched = match &plan.count {
                Some(statement) => Some(self.store.execute_count(statement).await?),
                None => None,
            };
            let features: FeatureStream = match &plan.fetch {
                Some(statement) => self.store.execute_query(statement).await?,
                None => Box::pin(stream::empty()),
            };
            Ok::<_, GeoqueryError>(FeatureQueryResult { number_matched, features })
        };

        match options.timeout.or(service.query_timeout) {
            Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
                tracing::warn!(layer = %layer.name, timeout_ms = limit.as_millis() as u64, "Feature query timed out");
                GeoqueryError::Timeout { timeout_ms: limit.as_millis() as u64 }
            })?,
            None => work.await,
        }
    }
}

fn temporal_filter(field: &str, interval: &TemporalInterval) -> FilterExpression {
    match (interval.start, interval.end) {
        (Some(start), Some(end)) if start == end => {
            FilterExpression::comparison(field, ComparisonOperator::Equal, Literal::DateTime(start))
        }
        (Some(start), Some(end)) => FilterExpression::Between {
            field: field.to_string(),
            lower: Literal::DateTime(start),
            upper: Literal::DateTime(end),
        },
        (Some(start), None) => {
            FilterExpression::comparison(field, ComparisonOperator::GreaterThanOrEqual, Literal::DateTime(start))
        }
        (None, Some(end)) => {
            FilterExpression::comparison(field, ComparisonOperator::LessThanOrEqual, Literal::DateTime(end))
        }
        (None, None) => FilterExpression::IsNull { field: field.to_string(), negated: true },
    }
}
