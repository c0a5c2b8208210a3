//! Port trait definitions
//!
//! These traits define the interfaces that data-store adapters must implement.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::models::{DatabaseProvider, FeatureRecord, SqlFragment};

/// Lazily produced feature rows; dropping the stream releases the cursor
pub type FeatureStream = BoxStream<'static, Result<FeatureRecord>>;

/// Port for executing translated statements against a backing database
#[async_trait]
pub trait FeatureDataStore: Send + Sync {
    /// The SQL dialect statements for this store must be written in
    fn provider(&self) -> DatabaseProvider;

    /// Whether the database has native spatial SQL (PostGIS, SpatiaLite, ...)
    fn has_native_spatial(&self) -> bool {
        true
    }

    /// Run a `SELECT COUNT(*)` statement
    async fn execute_count(&self, statement: &SqlFragment) -> Result<u64>;

    /// Run a feature query, yielding rows as they arrive
    async fn execute_query(&self, statement: &SqlFragment) -> Result<FeatureStream>;
}
