//! In-memory data store for development and testing
//!
//! The store does not interpret SQL. It records every statement it is asked
//! to run and answers with canned rows, which is enough to observe what the
//! executor sends and in which order.

use async_trait::async_trait;
use futures::stream;
use geoquery_core::error::Result;
use geoquery_core::models::{DatabaseProvider, FeatureRecord, SqlFragment};
use geoquery_core::ports::{FeatureDataStore, FeatureStream};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Which port method received a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Count,
    Query,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub kind: StatementKind,
    pub statement: SqlFragment,
}

/// In-memory implementation of FeatureDataStore
#[derive(Debug, Clone)]
pub struct MemoryDataStore {
    provider: DatabaseProvider,
    native_spatial: bool,
    records: Arc<Vec<FeatureRecord>>,
    count: Option<u64>,
    latency: Option<Duration>,
    statements: Arc<RwLock<Vec<RecordedStatement>>>,
}

impl Default for MemoryDataStore {
    fn default() -> Self {
        Self::new(DatabaseProvider::Postgres)
    }
}

impl MemoryDataStore {
    pub fn new(provider: DatabaseProvider) -> Self {
        Self {
            provider,
            native_spatial: true,
            records: Arc::new(Vec::new()),
            count: None,
            latency: None,
            statements: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Rows returned by every query
    pub fn with_records(mut self, records: Vec<FeatureRecord>) -> Self {
        self.records = Arc::new(records);
        self
    }

    /// Answer for count statements; defaults to the number of canned rows
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_native_spatial(mut self, native_spatial: bool) -> Self {
        self.native_spatial = native_spatial;
        self
    }

    /// Delay applied before each statement completes
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Statements received so far, oldest first
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.statements.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count_of(&self, kind: StatementKind) -> usize {
        self.statements
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    async fn record(&self, kind: StatementKind, statement: &SqlFragment) {
        tracing::trace!(?kind, sql = %statement.sql, "Memory store received statement");
        self.statements
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedStatement { kind, statement: statement.clone() });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl FeatureDataStore for MemoryDataStore {
    fn provider(&self) -> DatabaseProvider {
        self.provider
    }

    fn has_native_spatial(&self) -> bool {
        self.native_spatial
    }

    async fn execute_count(&self, statement: &SqlFragment) -> Result<u64> {
        self.record(StatementKind::Count, statement).await;
        Ok(self.count.unwrap_or(self.records.len() as u64))
    }

    async fn execute_query(&self, statement: &SqlFragment) -> Result<FeatureStream> {
        self.record(StatementKind::Query, statement).await;
        let rows: Vec<Result<FeatureRecord>> = self.records.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(rows)))
    }
}
