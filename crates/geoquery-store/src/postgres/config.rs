//! PostgreSQL configuration

use geoquery_core::error::GeoqueryError;
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DATABASE_URL_VAR: &str = "GEOQUERY_DATABASE_URL";
pub const STATEMENT_TIMEOUT_VAR: &str = "GEOQUERY_STATEMENT_TIMEOUT_MS";
pub const POOL_MAX_VAR: &str = "GEOQUERY_POOL_MAX";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid { key: key.to_string(), reason: reason.into() }
    }
}

impl From<ConfigError> for GeoqueryError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Missing(key) => GeoqueryError::ConfigMissing { key },
            ConfigError::Invalid { key, reason } => GeoqueryError::ConfigInvalid { key, reason },
        }
    }
}

/// Connection settings for [`PostgresDataStore`](super::PostgresDataStore)
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub pool: PoolConfig,
    /// Server-side `statement_timeout` set on every new connection
    pub statement_timeout: Option<Duration>,
    /// Fail at startup instead of reporting no native spatial support
    pub require_postgis: bool,
    /// Rows buffered between the cursor task and the consumer
    pub row_buffer: usize,
}

impl PostgresConfig {
    pub fn new(database_url: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            database_url: database_url.into(),
            pool: PoolConfig::default(),
            statement_timeout: None,
            require_postgis: false,
            row_buffer: 64,
        };
        config.validate()?;
        Ok(config)
    }

    /// `GEOQUERY_DATABASE_URL` (or `DATABASE_URL`) plus optional
    /// `GEOQUERY_STATEMENT_TIMEOUT_MS` and `GEOQUERY_POOL_MAX`
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var(DATABASE_URL_VAR)
            .or_else(|_| env::var("DATABASE_URL"))
            .map_err(|_| ConfigError::Missing(DATABASE_URL_VAR.to_string()))?;

        let mut config = Self::new(database_url)?;
        if let Some(ms) = env_number::<u64>(STATEMENT_TIMEOUT_VAR)? {
            config.statement_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(max) = env_number::<u32>(POOL_MAX_VAR)? {
            config.pool.max_connections = max;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::invalid("database_url", "cannot be empty"));
        }
        if self.row_buffer == 0 {
            return Err(ConfigError::invalid("row_buffer", "must be greater than 0"));
        }
        self.pool.validate()
    }
}

fn env_number<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::invalid(var, format!("'{}' is not a non-negative integer", raw))),
        Err(_) => Ok(None),
    }
}

/// Connection pool sizing and lifetimes
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: 1,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.min_connections, self.max_connections) {
            (_, 0) => Err(ConfigError::invalid("pool.max_connections", "must be greater than 0")),
            (min, max) if min > max => Err(ConfigError::invalid(
                "pool.min_connections",
                format!("{} exceeds max_connections {}", min, max),
            )),
            _ => Ok(()),
        }
    }

    pub fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .min_connections(self.min_connections)
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [DATABASE_URL_VAR, "DATABASE_URL", STATEMENT_TIMEOUT_VAR, POOL_MAX_VAR] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_blank_url_is_invalid() {
        match PostgresConfig::new("  ") {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "database_url"),
            other => panic!("Expected Invalid error, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_row_buffer_is_invalid() {
        let mut config = PostgresConfig::new("postgresql://localhost/gis").unwrap();
        config.row_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_bounds() {
        let pool = PoolConfig { min_connections: 20, max_connections: 10, ..Default::default() };
        assert!(pool.validate().is_err());
        let pool = PoolConfig { min_connections: 0, max_connections: 0, ..Default::default() };
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_converts_to_engine_error() {
        let err: GeoqueryError = ConfigError::Missing(DATABASE_URL_VAR.into()).into();
        assert!(matches!(err, GeoqueryError::ConfigMissing { .. }));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_overrides() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgresql://localhost/gis");
        std::env::set_var(STATEMENT_TIMEOUT_VAR, "2500");
        std::env::set_var(POOL_MAX_VAR, "4");

        let config = PostgresConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.database_url, "postgresql://localhost/gis");
        assert_eq!(config.statement_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.pool.max_connections, 4);
    }

    #[test]
    #[serial]
    fn test_from_env_missing_url() {
        clear_env();
        assert!(matches!(PostgresConfig::from_env(), Err(ConfigError::Missing(_))));
    }

    #[test]
    #[serial]
    fn test_from_env_bad_timeout() {
        clear_env();
        std::env::set_var(DATABASE_URL_VAR, "postgresql://localhost/gis");
        std::env::set_var(STATEMENT_TIMEOUT_VAR, "soon");

        let result = PostgresConfig::from_env();
        clear_env();

        assert!(matches!(result, Err(ConfigError::Invalid { key, .. }) if key == STATEMENT_TIMEOUT_VAR));
    }
}
