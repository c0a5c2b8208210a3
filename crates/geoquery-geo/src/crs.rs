//! CRS normalization, axis order and coordinate domains

use crate::models::{Coordinate, Crs, Geometry, Shape};
use geoquery_core::error::Result;

/// Web Mercator x bound in meters
const MERCATOR_MAX_X: f64 = 20_037_508.34;
/// Web Mercator y bound in meters
const MERCATOR_MAX_Y: f64 = 20_048_966.1;

/// Resolve a `srsName`/`crs` attribute, falling back to the caller default
/// and finally WGS 84
pub fn resolve_crs(explicit: Option<&str>, default: Option<Crs>) -> Result<Crs> {
    match explicit {
        Some(raw) => Crs::parse(raw),
        None => Ok(default.unwrap_or_else(Crs::wgs84)),
    }
}

/// Whether coordinates written under this identifier are latitude first
///
/// The URN and OGC URL forms follow the EPSG registry axis order, which is
/// latitude/longitude for geographic CRSs. `EPSG:<code>`, the GML 2 URL and
/// CRS84 are longitude first.
pub fn is_lat_lon_order(raw: &str, crs: &Crs) -> bool {
    if !crs.is_geographic() {
        return false;
    }
    let upper = raw.trim().to_ascii_uppercase();
    if upper.contains("CRS84") {
        return false;
    }
    upper.starts_with("URN:OGC:DEF:CRS:EPSG:")
        || upper.starts_with("URN:X-OGC:DEF:CRS:EPSG:")
        || upper.contains("/DEF/CRS/EPSG/")
}

/// Swap x and y of every coordinate
pub fn swap_axes(shape: &mut Shape) {
    fn swap(c: &mut Coordinate) {
        std::mem::swap(&mut c.x, &mut c.y);
    }
    match shape {
        Shape::Point(c) => swap(c),
        Shape::LineString(coords) | Shape::MultiPoint(coords) => coords.iter_mut().for_each(swap),
        Shape::Polygon(rings) | Shape::MultiLineString(rings) => {
            rings.iter_mut().flatten().for_each(swap)
        }
        Shape::MultiPolygon(polygons) => polygons.iter_mut().flatten().flatten().for_each(swap),
        Shape::GeometryCollection(shapes) => shapes.iter_mut().for_each(swap_axes),
        Shape::Envelope { min, max } => {
            swap(min);
            swap(max);
        }
    }
}

/// Valid coordinate domain of a CRS, when known
fn domain_of(crs: &Crs) -> Option<([f64; 2], [f64; 2])> {
    if crs.is_geographic() {
        Some(([-180.0, -90.0], [180.0, 90.0]))
    } else if crs.epsg == 3857 {
        Some(([-MERCATOR_MAX_X, -MERCATOR_MAX_Y], [MERCATOR_MAX_X, MERCATOR_MAX_Y]))
    } else {
        None
    }
}

/// First coordinate outside the valid domain of the geometry's CRS
pub fn outside_domain(geometry: &Geometry) -> Option<Coordinate> {
    let (min, max) = domain_of(&geometry.crs)?;
    let mut outside: Option<Coordinate> = None;
    geometry.shape.for_each_coordinate(&mut |c| {
        if outside.is_none() && (c.x < min[0] || c.x > max[0] || c.y < min[1] || c.y > max[1]) {
            outside = Some(*c);
        }
    });
    outside
}
