//! GeoQuery Store - SQL translation and data store adapters
//!
//! This crate turns canonical filters and feature queries into parameterized
//! SQL for each supported database, and provides the adapters that run those
//! statements behind the [`FeatureDataStore`](geoquery_core::ports::FeatureDataStore) port.

pub mod memory;
pub mod postgres;
pub mod statement;
pub mod translate;

pub use memory::{MemoryDataStore, RecordedStatement, StatementKind};
pub use postgres::{PostgresConfig, PostgresDataStore};
pub use statement::{StatementBuilder, GEOMETRY_COLUMN, ID_COLUMN};
pub use translate::{backend_for, translate_filter, SpatialMode, SqlBackend};
