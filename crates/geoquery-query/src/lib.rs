//! GeoQuery Query - Constraint resolution and feature query execution
//!
//! This crate turns raw request parameters into one canonical
//! [`FeatureQuery`](geoquery_core::models::FeatureQuery) and runs it against
//! a [`FeatureDataStore`](geoquery_core::ports::FeatureDataStore).

pub mod constraints;
pub mod executor;
pub mod params;

pub use constraints::{parse_bbox, QueryConstraintResolver, ResolvedConstraints};
pub use executor::{ExecutionOptions, FeatureQueryExecutor, FeatureQueryResult, QueryPlan};
pub use params::RequestParams;
