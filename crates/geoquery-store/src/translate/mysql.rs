//! MySQL 8 dialect
//!
//! Geographic SRSs make `ST_Distance` return meters, so one distance form
//! serves both storage kinds. There is no DE-9IM pattern function.

use super::backend::{st_function, SpatialCapabilities, SqlBackend};
use geoquery_core::error::Result;
use geoquery_core::models::{DatabaseProvider, SpatialPredicate};

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlBackend;

impl SpatialCapabilities for MySqlBackend {
    fn supports_native_spatial(&self) -> bool {
        true
    }

    fn supports_de9im(&self) -> bool {
        false
    }

    // Spatial indexes are used implicitly by the ST_ functions
    fn supports_envelope_index(&self) -> bool {
        false
    }

    fn supports_transform(&self) -> bool {
        true
    }
}

impl SqlBackend for MySqlBackend {
    fn provider(&self) -> DatabaseProvider {
        DatabaseProvider::MySql
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn geometry_from_text(&self, wkt: &str, srid: u32) -> String {
        format!("ST_GeomFromText({}, {}, 'axis-order=long-lat')", wkt, srid)
    }

    fn transform(&self, geometry: &str, srid: u32) -> String {
        format!("ST_Transform({}, {})", geometry, srid)
    }

    fn envelope_intersects(&self, column: &str, geometry: &str) -> String {
        format!("MBRIntersects({}, {})", column, geometry)
    }

    fn predicate(&self, predicate: SpatialPredicate, column: &str, geometry: &str) -> String {
        format!("{}({}, {})", st_function(predicate), column, geometry)
    }

    fn distance_within(&self, column: &str, geometry: &str, distance: &str, _geographic: bool, _srid: u32) -> String {
        format!("ST_Distance({}, {}) <= {}", column, geometry, distance)
    }

    fn like(&self, column: &str, pattern: &str) -> String {
        format!("{} LIKE {} ESCAPE '\\\\'", column, pattern)
    }

    fn case_insensitive_like(&self, column: &str, pattern: &str) -> String {
        format!("LOWER({}) LIKE LOWER({}) ESCAPE '\\\\'", column, pattern)
    }

    fn geometry_output(&self, column: &str, transform_to: Option<u32>) -> Result<String> {
        Ok(match transform_to {
            Some(srid) => format!("ST_AsGeoJSON({})", self.transform(column, srid)),
            None => format!("ST_AsGeoJSON({})", column),
        })
    }
}
