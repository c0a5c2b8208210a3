//! SQL Server dialect
//!
//! Spatial operations are methods on the `geometry` type and return bits, so
//! every predicate is compared with `= 1`. Geographic distances go through a
//! `geography` conversion. SQL Server cannot reproject.

use super::backend::{offset_value, SpatialCapabilities, SqlBackend, SqlWriter};
use geoquery_core::error::{GeoqueryError, Result, UnsupportedReason};
use geoquery_core::models::{DatabaseProvider, SpatialPredicate, SqlValue};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerBackend;

fn method(predicate: SpatialPredicate) -> &'static str {
    match predicate {
        SpatialPredicate::Contains => "STContains",
        SpatialPredicate::Within => "STWithin",
        SpatialPredicate::Touches => "STTouches",
        SpatialPredicate::Crosses => "STCrosses",
        SpatialPredicate::Overlaps => "STOverlaps",
        SpatialPredicate::Disjoint => "STDisjoint",
        SpatialPredicate::Equals => "STEquals",
        _ => "STIntersects",
    }
}

fn to_geography(geometry: &str, srid: u32) -> String {
    format!("geography::STGeomFromText({}.STAsText(), {})", geometry, srid)
}

impl SpatialCapabilities for SqlServerBackend {
    fn supports_native_spatial(&self) -> bool {
        true
    }

    fn supports_de9im(&self) -> bool {
        true
    }

    fn supports_envelope_index(&self) -> bool {
        false
    }

    fn supports_transform(&self) -> bool {
        false
    }
}

impl SqlBackend for SqlServerBackend {
    fn provider(&self) -> DatabaseProvider {
        DatabaseProvider::SqlServer
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{}", index)
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn geometry_from_text(&self, wkt: &str, srid: u32) -> String {
        format!("geometry::STGeomFromText({}, {})", wkt, srid)
    }

    fn transform(&self, geometry: &str, _srid: u32) -> String {
        geometry.to_string()
    }

    fn envelope_intersects(&self, column: &str, geometry: &str) -> String {
        format!("{}.STEnvelope().STIntersects({}.STEnvelope()) = 1", column, geometry)
    }

    fn predicate(&self, predicate: SpatialPredicate, column: &str, geometry: &str) -> String {
        format!("{}.{}({}) = 1", column, method(predicate), geometry)
    }

    fn distance_within(&self, column: &str, geometry: &str, distance: &str, geographic: bool, srid: u32) -> String {
        if geographic {
            format!(
                "{}.STDistance({}) <= {}",
                to_geography(column, srid),
                to_geography(geometry, srid),
                distance
            )
        } else {
            format!("{}.STDistance({}) <= {}", column, geometry, distance)
        }
    }

    fn relate(&self, column: &str, geometry: &str, pattern: &str) -> Result<String> {
        Ok(format!("{}.STRelate({}, {}) = 1", column, geometry, pattern))
    }

    /// `[` opens a character class in T-SQL patterns
    fn like_pattern(&self, pattern: &str) -> String {
        let mut out = String::with_capacity(pattern.len());
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    out.push('\\');
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '[' => out.push_str("\\["),
                other => out.push(other),
            }
        }
        out
    }

    fn geometry_output(&self, column: &str, transform_to: Option<u32>) -> Result<String> {
        if let Some(srid) = transform_to {
            return Err(GeoqueryError::unsupported(
                format!("output in EPSG:{}", srid),
                self.label(),
                UnsupportedReason::TransformUnavailable,
            ));
        }
        Ok(format!("{}.STAsText()", column))
    }

    fn paging_requires_order(&self) -> bool {
        true
    }

    fn paginate(&self, writer: &mut SqlWriter<'_>, limit: u32, offset: u64) {
        let offset = writer.bind(SqlValue::Integer(offset_value(offset)));
        let limit = writer.bind(SqlValue::Integer(i64::from(limit)));
        writer.push(&format!(" OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit));
    }
}
