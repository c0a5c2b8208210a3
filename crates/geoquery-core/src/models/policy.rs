use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::catalog::FieldCatalog;
use super::geometry::{Crs, ValidityMode};
use super::query::ABSOLUTE_MAX_LIMIT;
use crate::error::GeoqueryError;

/// Relational backends a filter can be translated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseProvider {
    Postgres,
    MySql,
    SqlServer,
    Sqlite,
}

impl DatabaseProvider {
    pub fn name(&self) -> &'static str {
        match self {
            DatabaseProvider::Postgres => "postgres",
            DatabaseProvider::MySql => "mysql",
            DatabaseProvider::SqlServer => "sqlserver",
            DatabaseProvider::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for DatabaseProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatabaseProvider {
    type Err = GeoqueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "postgis" => Ok(DatabaseProvider::Postgres),
            "mysql" | "mariadb" => Ok(DatabaseProvider::MySql),
            "sqlserver" | "mssql" => Ok(DatabaseProvider::SqlServer),
            "sqlite" | "spatialite" | "geopackage" | "gpkg" => Ok(DatabaseProvider::Sqlite),
            _ => Err(GeoqueryError::ConfigInvalid {
                key: "provider".to_string(),
                reason: format!(
                    "Unknown database provider: {}. Use postgres, mysql, sqlserver, or sqlite",
                    s
                ),
            }),
        }
    }
}

/// What to do when a backend lacks native spatial SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SpatialFallback {
    /// Fail the request with `UnsupportedOperation`
    #[default]
    Reject,
    /// Approximate predicates with an envelope test on the layer's R-tree
    BoundingBoxOnly,
}

/// Per-request parser bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserLimits {
    pub max_filter_depth: usize,
    pub max_geometry_vertices: usize,
    pub max_total_vertices: usize,
    pub max_in_values: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_filter_depth: 10,
            max_geometry_vertices: 10_000,
            max_total_vertices: 1_000_000,
            max_in_values: 1000,
        }
    }
}

/// Service-wide query policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePolicy {
    pub default_limit: u32,
    pub max_record_count: Option<u32>,
    pub absolute_max_limit: u32,
    pub default_crs: Option<Crs>,
    pub parser: ParserLimits,
    pub geometry_validity: ValidityMode,
    pub spatial_fallback: SpatialFallback,
    pub query_timeout: Option<Duration>,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_record_count: None,
            absolute_max_limit: ABSOLUTE_MAX_LIMIT,
            default_crs: None,
            parser: ParserLimits::default(),
            geometry_validity: ValidityMode::Lenient,
            spatial_fallback: SpatialFallback::Reject,
            query_timeout: None,
        }
    }
}

/// Everything the engine knows about one published layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerPolicy {
    pub name: String,

    /// Backing table or view
    pub table: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(flatten)]
    pub catalog: FieldCatalog,

    /// CRS the geometry column is stored in, when not declared on the field
    #[serde(default)]
    pub storage_crs: Crs,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_crs: Option<Crs>,

    /// Output CRSs this layer can serve; empty means any
    #[serde(default)]
    pub supported_crs: Vec<Crs>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_record_count: Option<u32>,

    /// Timestamp column matched by `datetime` parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_field: Option<String>,
}

impl LayerPolicy {
    pub fn new(name: impl Into<String>, table: impl Into<String>, catalog: FieldCatalog) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            schema: None,
            catalog,
            storage_crs: Crs::wgs84(),
            default_crs: None,
            supported_crs: Vec::new(),
            max_record_count: None,
            temporal_field: None,
        }
    }

    /// CRS of the default geometry column
    pub fn geometry_crs(&self) -> Crs {
        self.catalog.geometry_field().and_then(|f| f.srid).unwrap_or(self.storage_crs)
    }

    pub fn supports_crs(&self, crs: &Crs) -> bool {
        self.supported_crs.is_empty()
            || self.supported_crs.contains(crs)
            || *crs == self.geometry_crs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::{FieldDefinition, FieldType};

    #[test]
    fn test_provider_aliases() {
        assert_eq!("PostGIS".parse::<DatabaseProvider>().unwrap(), DatabaseProvider::Postgres);
        assert_eq!("mssql".parse::<DatabaseProvider>().unwrap(), DatabaseProvider::SqlServer);
        assert_eq!("gpkg".parse::<DatabaseProvider>().unwrap(), DatabaseProvider::Sqlite);
        assert!("oracle".parse::<DatabaseProvider>().is_err());
    }

    #[test]
    fn test_layer_crs_support() {
        let catalog = FieldCatalog::new(vec![
            FieldDefinition::new("id", FieldType::Integer),
            FieldDefinition::geometry("geom", Crs::new(25832)),
        ]);
        let mut layer = LayerPolicy::new("parcels", "parcels", catalog);
        assert_eq!(layer.geometry_crs(), Crs::new(25832));
        assert!(layer.supports_crs(&Crs::new(2056)));

        layer.supported_crs = vec![Crs::wgs84()];
        assert!(layer.supports_crs(&Crs::wgs84()));
        assert!(layer.supports_crs(&Crs::new(25832)));
        assert!(!layer.supports_crs(&Crs::new(2056)));
    }
}
