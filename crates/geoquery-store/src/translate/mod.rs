//! SQL translation
//!
//! A [`SqlBackend`] spells SQL for one database; [`FilterTranslator`] walks a
//! filter tree and asks the backend for each fragment, consulting its
//! [`SpatialCapabilities`] rather than the provider name.

mod backend;
mod filter;
mod mysql;
mod postgres;
mod sqlite;
mod sqlserver;

pub use backend::{SpatialCapabilities, SpatialMode, SpatialTarget, SqlBackend, SqlWriter};
pub use filter::{translate_filter, FilterTranslator};
pub use mysql::MySqlBackend;
pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;
pub use sqlserver::SqlServerBackend;

pub(crate) use backend::offset_value;

use geoquery_core::models::DatabaseProvider;

/// Backend for a provider; `native_spatial` only matters for SQLite, where
/// it selects SpatiaLite over a plain GeoPackage file
pub fn backend_for(provider: DatabaseProvider, native_spatial: bool) -> Box<dyn SqlBackend> {
    match provider {
        DatabaseProvider::Postgres => Box::new(PostgresBackend),
        DatabaseProvider::MySql => Box::new(MySqlBackend),
        DatabaseProvider::SqlServer => Box::new(SqlServerBackend),
        DatabaseProvider::Sqlite if native_spatial => Box::new(SqliteBackend::spatialite()),
        DatabaseProvider::Sqlite => Box::new(SqliteBackend::plain()),
    }
}
