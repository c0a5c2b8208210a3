//! PostgreSQL / PostGIS data store

pub mod config;
mod rows;

pub use config::{ConfigError, PoolConfig, PostgresConfig};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use geoquery_core::error::{GeoqueryError, Result};
use geoquery_core::models::{DatabaseProvider, SqlFragment, SqlValue};
use geoquery_core::ports::{FeatureDataStore, FeatureStream};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tokio::sync::mpsc;

/// PostgreSQL storage adapter
pub struct PostgresDataStore {
    pool: PgPool,
    config: PostgresConfig,
    postgis: bool,
}

impl PostgresDataStore {
    /// Connect, apply session settings and probe for PostGIS
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        config.validate()?;

        let statement_timeout = config.statement_timeout.map(|t| t.as_millis());
        let pool = config
            .pool
            .options()
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if let Some(ms) = statement_timeout {
                        let sql = format!("SET statement_timeout = {}", ms);
                        sqlx::query(&sql).execute(conn).await?;
                    }
                    Ok(())
                })
            })
            .connect(&config.database_url)
            .await
            .map_err(|e| GeoqueryError::Execution(format!("Failed to connect to database: {}", e)))?;

        let postgis: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_extension WHERE extname = 'postgis')")
            .fetch_one(&pool)
            .await
            .map_err(|e| GeoqueryError::Execution(format!("Connection test failed: {}", e)))?;

        if !postgis && config.require_postgis {
            return Err(GeoqueryError::ConfigInvalid {
                key: "database_url".to_string(),
                reason: "the PostGIS extension is not installed".to_string(),
            });
        }

        tracing::info!(postgis, max_connections = config.pool.max_connections, "Connected to PostgreSQL");
        Ok(Self { pool, config, postgis })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    /// Perform a health check on the database connection
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| GeoqueryError::Execution(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}

/// Attach parameters in placeholder order
fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for value in params {
        query = match value {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Boolean(b) => query.bind(*b),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Double(d) => query.bind(*d),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Timestamp(t) => query.bind(*t),
        };
    }
    query
}

fn execution_error(e: sqlx::Error) -> GeoqueryError {
    if let sqlx::Error::Database(db) = &e {
        // 57014: query_canceled, raised by statement_timeout
        if db.code().as_deref() == Some("57014") {
            return GeoqueryError::Execution(format!("Statement cancelled by the server: {}", db.message()));
        }
    }
    GeoqueryError::Execution(format!("Query failed: {}", e))
}

#[async_trait]
impl FeatureDataStore for PostgresDataStore {
    fn provider(&self) -> DatabaseProvider {
        DatabaseProvider::Postgres
    }

    fn has_native_spatial(&self) -> bool {
        self.postgis
    }

    async fn execute_count(&self, statement: &SqlFragment) -> Result<u64> {
        let row = bind_params(sqlx::query(&statement.sql), &statement.params)
            .fetch_one(&self.pool)
            .await
            .map_err(execution_error)?;
        let count: i64 = row.try_get(0).map_err(execution_error)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn execute_query(&self, statement: &SqlFragment) -> Result<FeatureStream> {
        let pool = self.pool.clone();
        let statement = statement.clone();
        let (tx, rx) = mpsc::channel(self.config.row_buffer);

        // The cursor lives in its own task; dropping the stream closes the
        // channel and the task stops at its next send.
        tokio::spawn(async move {
            let mut cursor = bind_params(sqlx::query(&statement.sql), &statement.params).fetch(&pool);
            while let Some(row) = cursor.next().await {
                let item = row.map_err(execution_error).and_then(|row| rows::decode(&row));
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        Ok(Box::pin(stream))
    }
}
