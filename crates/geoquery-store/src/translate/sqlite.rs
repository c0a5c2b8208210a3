//! SQLite dialect, with or without the SpatiaLite extension
//!
//! SpatiaLite functions return -1 on error, so predicates compare with `= 1`
//! instead of relying on truthiness. Plain SQLite (GeoPackage) has no spatial
//! SQL; envelope tests go against the `rtree_<table>_<column>` index.

use super::backend::{st_function, SpatialCapabilities, SpatialTarget, SqlBackend, SqlWriter};
use geoquery_core::error::{GeoqueryError, Result, UnsupportedReason};
use geoquery_core::models::{BoundingBox, DatabaseProvider, SpatialPredicate, SqlValue};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBackend {
    spatialite: bool,
}

impl SqliteBackend {
    pub fn plain() -> Self {
        Self { spatialite: false }
    }

    pub fn spatialite() -> Self {
        Self { spatialite: true }
    }
}

impl SpatialCapabilities for SqliteBackend {
    fn supports_native_spatial(&self) -> bool {
        self.spatialite
    }

    fn supports_de9im(&self) -> bool {
        self.spatialite
    }

    fn supports_envelope_index(&self) -> bool {
        self.spatialite
    }

    fn supports_transform(&self) -> bool {
        self.spatialite
    }
}

impl SqlBackend for SqliteBackend {
    fn provider(&self) -> DatabaseProvider {
        DatabaseProvider::Sqlite
    }

    fn label(&self) -> &'static str {
        if self.spatialite {
            "spatialite"
        } else {
            "sqlite"
        }
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn geometry_from_text(&self, wkt: &str, srid: u32) -> String {
        format!("GeomFromText({}, {})", wkt, srid)
    }

    fn transform(&self, geometry: &str, srid: u32) -> String {
        format!("Transform({}, {})", geometry, srid)
    }

    fn envelope_intersects(&self, column: &str, geometry: &str) -> String {
        format!("MbrIntersects({}, {}) = 1", column, geometry)
    }

    fn predicate(&self, predicate: SpatialPredicate, column: &str, geometry: &str) -> String {
        format!("{}({}, {}) = 1", st_function(predicate), column, geometry)
    }

    /// SpatiaLite's `SpatialIndex` virtual table
    fn envelope_prefilter(
        &self,
        writer: &mut SqlWriter<'_>,
        target: SpatialTarget<'_>,
        _column: &str,
        geometry: &str,
    ) -> Option<String> {
        if !self.spatialite {
            return None;
        }
        let table = writer.bind(SqlValue::Text(target.table.to_string()));
        let column = writer.bind(SqlValue::Text(target.column.to_string()));
        Some(format!(
            "ROWID IN (SELECT ROWID FROM SpatialIndex WHERE search_frame = {} AND f_table_name = {} AND f_geometry_column = {})",
            geometry, table, column
        ))
    }

    fn envelope_filter(
        &self,
        writer: &mut SqlWriter<'_>,
        target: SpatialTarget<'_>,
        column: &str,
        bbox: &BoundingBox,
        srid: u32,
    ) -> Result<String> {
        if self.spatialite {
            let wkt = writer.bind(SqlValue::Text(super::backend::envelope_wkt(bbox)));
            return Ok(self.envelope_intersects(column, &self.geometry_from_text(&wkt, srid)));
        }

        let rtree = self.quote_identifier(&format!("rtree_{}_{}", target.table, target.column));
        let max_x = writer.bind(SqlValue::Double(bbox.max_x));
        let min_x = writer.bind(SqlValue::Double(bbox.min_x));
        let max_y = writer.bind(SqlValue::Double(bbox.max_y));
        let min_y = writer.bind(SqlValue::Double(bbox.min_y));
        Ok(format!(
            "ROWID IN (SELECT id FROM {} WHERE minx <= {} AND maxx >= {} AND miny <= {} AND maxy >= {})",
            rtree, max_x, min_x, max_y, min_y
        ))
    }

    fn distance_within(&self, column: &str, geometry: &str, distance: &str, geographic: bool, _srid: u32) -> String {
        if geographic {
            format!("PtDistWithin({}, {}, {}) = 1", column, geometry, distance)
        } else {
            format!("ST_Distance({}, {}) <= {}", column, geometry, distance)
        }
    }

    fn relate(&self, column: &str, geometry: &str, pattern: &str) -> Result<String> {
        if !self.spatialite {
            return Err(GeoqueryError::unsupported(
                SpatialPredicate::Relate.name(),
                self.label(),
                UnsupportedReason::De9imUnavailable,
            ));
        }
        Ok(format!("ST_Relate({}, {}, {}) = 1", column, geometry, pattern))
    }

    fn geometry_output(&self, column: &str, transform_to: Option<u32>) -> Result<String> {
        match (self.spatialite, transform_to) {
            (true, Some(srid)) => Ok(format!("AsGeoJSON({})", self.transform(column, srid))),
            (true, None) => Ok(format!("AsGeoJSON({})", column)),
            (false, None) => Ok(column.to_string()),
            (false, Some(srid)) => Err(GeoqueryError::unsupported(
                format!("output in EPSG:{}", srid),
                self.label(),
                UnsupportedReason::TransformUnavailable,
            )),
        }
    }
}
