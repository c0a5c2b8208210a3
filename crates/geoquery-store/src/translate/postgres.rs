//! PostgreSQL / PostGIS dialect

use super::backend::{st_function, SpatialCapabilities, SqlBackend};
use geoquery_core::error::Result;
use geoquery_core::models::{DatabaseProvider, SpatialPredicate};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresBackend;

impl SpatialCapabilities for PostgresBackend {
    fn supports_native_spatial(&self) -> bool {
        true
    }

    fn supports_de9im(&self) -> bool {
        true
    }

    fn supports_envelope_index(&self) -> bool {
        true
    }

    fn supports_transform(&self) -> bool {
        true
    }
}

impl SqlBackend for PostgresBackend {
    fn provider(&self) -> DatabaseProvider {
        DatabaseProvider::Postgres
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn geometry_from_text(&self, wkt: &str, srid: u32) -> String {
        format!("ST_GeomFromText({}, {})", wkt, srid)
    }

    fn transform(&self, geometry: &str, srid: u32) -> String {
        format!("ST_Transform({}, {})", geometry, srid)
    }

    fn envelope_intersects(&self, column: &str, geometry: &str) -> String {
        format!("{} && {}", column, geometry)
    }

    fn predicate(&self, predicate: SpatialPredicate, column: &str, geometry: &str) -> String {
        format!("{}({}, {})", st_function(predicate), column, geometry)
    }

    fn distance_within(&self, column: &str, geometry: &str, distance: &str, geographic: bool, _srid: u32) -> String {
        if geographic {
            format!("ST_DWithin({}::geography, {}::geography, {})", column, geometry, distance)
        } else {
            format!("ST_DWithin({}, {}, {})", column, geometry, distance)
        }
    }

    fn relate(&self, column: &str, geometry: &str, pattern: &str) -> Result<String> {
        Ok(format!("ST_Relate({}, {}, {})", column, geometry, pattern))
    }

    fn case_insensitive_like(&self, column: &str, pattern: &str) -> String {
        format!("{} ILIKE {} ESCAPE '\\'", column, pattern)
    }

    fn geometry_output(&self, column: &str, transform_to: Option<u32>) -> Result<String> {
        Ok(match transform_to {
            Some(srid) => format!("ST_AsGeoJSON({})", self.transform(column, srid)),
            None => format!("ST_AsGeoJSON({})", column),
        })
    }
}
