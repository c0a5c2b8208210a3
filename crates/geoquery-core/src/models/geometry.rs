//! Canonical geometry types used across all geoquery crates.
//!
//! Every geometry literal that reaches a filter, whatever dialect it was
//! written in, is normalized into [`Geometry`]: a [`Shape`] plus the [`Crs`]
//! its coordinates are expressed in.

use crate::error::{GeoqueryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System identified by EPSG code
///
/// The canonical textual form is `EPSG:<code>`. OGC CRS84 is normalized to
/// EPSG:4326 (same datum, longitude-first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    pub epsg: u32,
}

impl TryFrom<String> for Crs {
    type Error = GeoqueryError;

    fn try_from(value: String) -> Result<Self> {
        Crs::parse(&value)
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl Crs {
    pub fn new(epsg: u32) -> Self {
        Self { epsg }
    }

    /// WGS 84 (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::new(4326)
    }

    /// Web Mercator (EPSG:3857)
    pub fn web_mercator() -> Self {
        Self::new(3857)
    }

    /// Whether coordinates in this CRS are angular degrees
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, 4326 | 4258 | 4269 | 4283 | 4617 | 4674)
    }

    /// Parse any of the accepted CRS identifier forms
    ///
    /// Accepts `EPSG:<code>`, bare codes, OGC URNs (`urn:ogc:def:crs:EPSG::<code>`,
    /// optionally versioned), OGC URLs (`http://www.opengis.net/def/crs/EPSG/0/<code>`),
    /// the GML 2 form (`http://www.opengis.net/gml/srs/epsg.xml#<code>`) and CRS84.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let invalid = || GeoqueryError::parse(format!("Unrecognized CRS identifier '{}'", raw), "crs");

        if trimmed.is_empty() {
            return Err(invalid());
        }

        let upper = trimmed.to_ascii_uppercase();
        if upper == "CRS84"
            || upper.ends_with(":CRS84")
            || upper.ends_with("/CRS84")
        {
            return Ok(Self::wgs84());
        }

        let code = if let Some(rest) = upper.strip_prefix("EPSG:") {
            rest
        } else if upper.starts_with("URN:OGC:DEF:CRS:EPSG:") || upper.starts_with("URN:X-OGC:DEF:CRS:EPSG:")
        {
            // urn:ogc:def:crs:EPSG:[version]:<code>
            upper.rsplit(':').next().unwrap_or_default()
        } else if upper.starts_with("HTTP://") || upper.starts_with("HTTPS://") {
            if let Some((_, code)) = upper.split_once("EPSG.XML#") {
                code
            } else if upper.contains("/DEF/CRS/EPSG/") {
                upper.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
            } else {
                return Err(invalid());
            }
        } else {
            upper.as_str()
        };

        let epsg = code.trim().parse::<u32>().map_err(|_| invalid())?;
        if epsg == 0 {
            return Err(invalid());
        }

        // Legacy Google Mercator alias
        Ok(if epsg == 900913 { Self::web_mercator() } else { Self::new(epsg) })
    }
}

/// Distance units for spatial operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DistanceUnit {
    #[default]
    Meters,
    Kilometers,
    Miles,
    Feet,
    Yards,
    NauticalMiles,
}

impl DistanceUnit {
    /// Convert a distance value to meters
    pub fn to_meters(&self, value: f64) -> f64 {
        match self {
            DistanceUnit::Meters => value,
            DistanceUnit::Kilometers => value * 1000.0,
            DistanceUnit::Miles => value * 1609.344,
            DistanceUnit::Feet => value * 0.3048,
            DistanceUnit::Yards => value * 0.9144,
            DistanceUnit::NauticalMiles => value * 1852.0,
        }
    }

    /// Convert a distance value from meters to this unit
    pub fn from_meters(&self, meters: f64) -> f64 {
        meters / self.to_meters(1.0)
    }

    /// Resolve a unit token as written in filters (`meter`, `km`, `nautical mile`,
    /// EPSG unit URNs, ...)
    pub fn from_token(token: &str) -> Option<Self> {
        let normalized = token.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        let unit = match normalized.as_str() {
            "m" | "meter" | "meters" | "metre" | "metres" | "urn:ogc:def:uom:epsg::9001" => {
                DistanceUnit::Meters
            }
            "km" | "kilometer" | "kilometers" | "kilometre" | "kilometres"
            | "urn:ogc:def:uom:epsg::9036" => DistanceUnit::Kilometers,
            "mi" | "mile" | "miles" | "statute mile" | "statute miles"
            | "urn:ogc:def:uom:epsg::9093" => DistanceUnit::Miles,
            "ft" | "foot" | "feet" | "urn:ogc:def:uom:epsg::9002" => DistanceUnit::Feet,
            "yd" | "yard" | "yards" | "urn:ogc:def:uom:epsg::9096" => DistanceUnit::Yards,
            "nmi" | "nm" | "nautical mile" | "nautical miles" | "urn:ogc:def:uom:epsg::9030" => {
                DistanceUnit::NauticalMiles
            }
            _ => return None,
        };
        Some(unit)
    }
}

/// Distance with unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distance {
    pub value: f64,
    pub unit: DistanceUnit,
}

impl Distance {
    /// Create a new distance
    pub fn new(value: f64, unit: DistanceUnit) -> Self {
        Self { value, unit }
    }

    /// Create distance in meters
    pub fn meters(value: f64) -> Self {
        Self::new(value, DistanceUnit::Meters)
    }

    /// Convert to meters
    pub fn to_meters(&self) -> f64 {
        self.unit.to_meters(self.value)
    }

    /// Same distance expressed in meters
    pub fn normalized(&self) -> Self {
        Self::meters(self.to_meters())
    }
}

/// Geometry validation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ValidityMode {
    /// Strict validation - reject any invalid geometries
    Strict,
    /// Lenient validation - attempt to fix invalid geometries
    #[default]
    Lenient,
}

/// Spatial predicate for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialPredicate {
    /// Bounding boxes intersect
    BBox,
    Intersects,
    Contains,
    Within,
    Touches,
    Crosses,
    Overlaps,
    Disjoint,
    Equals,
    /// Geometry is within a distance of the filter geometry
    DWithin,
    /// Custom DE-9IM intersection pattern
    Relate,
}

impl SpatialPredicate {
    pub fn name(&self) -> &'static str {
        match self {
            SpatialPredicate::BBox => "BBOX",
            SpatialPredicate::Intersects => "Intersects",
            SpatialPredicate::Contains => "Contains",
            SpatialPredicate::Within => "Within",
            SpatialPredicate::Touches => "Touches",
            SpatialPredicate::Crosses => "Crosses",
            SpatialPredicate::Overlaps => "Overlaps",
            SpatialPredicate::Disjoint => "Disjoint",
            SpatialPredicate::Equals => "Equals",
            SpatialPredicate::DWithin => "DWithin",
            SpatialPredicate::Relate => "Relate",
        }
    }

    /// Whether a match implies the two envelopes overlap, so an index-backed
    /// envelope test can run before the exact predicate
    pub fn implies_envelope_overlap(&self) -> bool {
        matches!(
            self,
            SpatialPredicate::BBox
                | SpatialPredicate::Intersects
                | SpatialPredicate::Contains
                | SpatialPredicate::Within
                | SpatialPredicate::Touches
                | SpatialPredicate::Crosses
                | SpatialPredicate::Overlaps
                | SpatialPredicate::Equals
        )
    }
}

/// Geometry type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
    Envelope,
}

/// A position with optional elevation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.map_or(true, f64::is_finite)
    }

    /// Compare planar position, ignoring z
    pub fn same_xy(&self, other: &Coordinate) -> bool {
        self.x == other.x && self.y == other.y
    }

    fn to_position(self) -> serde_json::Value {
        match self.z {
            Some(z) => serde_json::json!([self.x, self.y, z]),
            None => serde_json::json!([self.x, self.y]),
        }
    }
}

/// Geometry shape without CRS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Shape {
    Point(Coordinate),
    LineString(Vec<Coordinate>),
    Polygon(Vec<Vec<Coordinate>>),
    MultiPoint(Vec<Coordinate>),
    MultiLineString(Vec<Vec<Coordinate>>),
    MultiPolygon(Vec<Vec<Vec<Coordinate>>>),
    GeometryCollection(Vec<Shape>),
    Envelope { min: Coordinate, max: Coordinate },
}

impl Shape {
    /// Get the geometry type
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Shape::Point(_) => GeometryType::Point,
            Shape::LineString(_) => GeometryType::LineString,
            Shape::Polygon(_) => GeometryType::Polygon,
            Shape::MultiPoint(_) => GeometryType::MultiPoint,
            Shape::MultiLineString(_) => GeometryType::MultiLineString,
            Shape::MultiPolygon(_) => GeometryType::MultiPolygon,
            Shape::GeometryCollection(_) => GeometryType::GeometryCollection,
            Shape::Envelope { .. } => GeometryType::Envelope,
        }
    }

    /// Visit every coordinate in document order
    pub fn for_each_coordinate<F: FnMut(&Coordinate)>(&self, f: &mut F) {
        match self {
            Shape::Point(c) => f(c),
            Shape::LineString(coords) | Shape::MultiPoint(coords) => coords.iter().for_each(f),
            Shape::Polygon(rings) | Shape::MultiLineString(rings) => {
                rings.iter().flatten().for_each(f)
            }
            Shape::MultiPolygon(polygons) => polygons.iter().flatten().flatten().for_each(f),
            Shape::GeometryCollection(shapes) => {
                for shape in shapes {
                    shape.for_each_coordinate(f);
                }
            }
            Shape::Envelope { min, max } => {
                f(min);
                f(max);
            }
        }
    }

    /// Total number of vertices
    pub fn vertex_count(&self) -> usize {
        let mut count = 0;
        self.for_each_coordinate(&mut |_| count += 1);
        count
    }

    /// Number of polygon rings (exterior and interior) in the shape
    pub fn ring_count(&self) -> usize {
        match self {
            Shape::Polygon(rings) => rings.len(),
            Shape::MultiPolygon(polygons) => polygons.iter().map(Vec::len).sum(),
            Shape::GeometryCollection(shapes) => shapes.iter().map(Shape::ring_count).sum(),
            Shape::Envelope { .. } => 1,
            _ => 0,
        }
    }

    fn to_geojson(&self) -> serde_json::Value {
        let line = |coords: &[Coordinate]| -> Vec<serde_json::Value> {
            coords.iter().map(|c| c.to_position()).collect()
        };
        let rings = |rings: &[Vec<Coordinate>]| -> Vec<Vec<serde_json::Value>> {
            rings.iter().map(|r| line(r)).collect()
        };

        match self {
            Shape::Point(c) => serde_json::json!({ "type": "Point", "coordinates": c.to_position() }),
            Shape::LineString(coords) => {
                serde_json::json!({ "type": "LineString", "coordinates": line(coords) })
            }
            Shape::Polygon(r) => serde_json::json!({ "type": "Polygon", "coordinates": rings(r) }),
            Shape::MultiPoint(coords) => {
                serde_json::json!({ "type": "MultiPoint", "coordinates": line(coords) })
            }
            Shape::MultiLineString(r) => {
                serde_json::json!({ "type": "MultiLineString", "coordinates": rings(r) })
            }
            Shape::MultiPolygon(polygons) => {
                let coordinates: Vec<_> = polygons.iter().map(|p| rings(p)).collect();
                serde_json::json!({ "type": "MultiPolygon", "coordinates": coordinates })
            }
            Shape::GeometryCollection(shapes) => {
                let geometries: Vec<_> = shapes.iter().map(Shape::to_geojson).collect();
                serde_json::json!({ "type": "GeometryCollection", "geometries": geometries })
            }
            Shape::Envelope { min, max } => {
                Shape::Polygon(vec![envelope_ring(min, max)]).to_geojson()
            }
        }
    }
}

/// Counter-clockwise closed ring for an envelope
pub fn envelope_ring(min: &Coordinate, max: &Coordinate) -> Vec<Coordinate> {
    vec![
        Coordinate::new(min.x, min.y),
        Coordinate::new(max.x, min.y),
        Coordinate::new(max.x, max.y),
        Coordinate::new(min.x, max.y),
        Coordinate::new(min.x, min.y),
    ]
}

/// A shape with the CRS its coordinates are expressed in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub shape: Shape,
    pub crs: Crs,
}

impl Geometry {
    pub fn new(shape: Shape, crs: Crs) -> Self {
        Self { shape, crs }
    }

    /// Create a Point geometry in WGS 84
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(Shape::Point(Coordinate::new(x, y)), Crs::wgs84())
    }

    /// Create an envelope geometry from a bounding box
    pub fn envelope(bbox: &BoundingBox, default_crs: Crs) -> Self {
        Self::new(
            Shape::Envelope {
                min: Coordinate::new(bbox.min_x, bbox.min_y),
                max: Coordinate::new(bbox.max_x, bbox.max_y),
            },
            bbox.crs.unwrap_or(default_crs),
        )
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.shape.geometry_type()
    }

    pub fn vertex_count(&self) -> usize {
        self.shape.vertex_count()
    }

    /// Bounding box of all coordinates, or `None` for an empty geometry
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut bbox: Option<BoundingBox> = None;
        self.shape.for_each_coordinate(&mut |c| {
            let b = bbox.get_or_insert_with(|| BoundingBox {
                min_x: c.x,
                min_y: c.y,
                max_x: c.x,
                max_y: c.y,
                min_z: c.z,
                max_z: c.z,
                crs: None,
            });
            b.min_x = b.min_x.min(c.x);
            b.min_y = b.min_y.min(c.y);
            b.max_x = b.max_x.max(c.x);
            b.max_y = b.max_y.max(c.y);
            if let Some(z) = c.z {
                b.min_z = Some(b.min_z.map_or(z, |m| m.min(z)));
                b.max_z = Some(b.max_z.map_or(z, |m| m.max(z)));
            }
        });
        bbox.map(|b| BoundingBox { crs: Some(self.crs), ..b })
    }

    /// Convert to serde_json::Value (GeoJSON)
    pub fn to_geojson(&self) -> serde_json::Value {
        self.shape.to_geojson()
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub min_z: Option<f64>,
    pub max_z: Option<f64>,
    pub crs: Option<Crs>,
}

impl BoundingBox {
    /// Create a 2D bounding box, enforcing min <= max on both axes
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        let bbox = Self { min_x, min_y, max_x, max_y, min_z: None, max_z: None, crs: None };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Create a 3D bounding box, enforcing min <= max on every axis
    pub fn new_3d(min: [f64; 3], max: [f64; 3]) -> Result<Self> {
        let bbox = Self {
            min_x: min[0],
            min_y: min[1],
            max_x: max[0],
            max_y: max[1],
            min_z: Some(min[2]),
            max_z: Some(max[2]),
            crs: None,
        };
        bbox.validate()?;
        Ok(bbox)
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    fn validate(&self) -> Result<()> {
        let mut values = vec![self.min_x, self.min_y, self.max_x, self.max_y];
        values.extend(self.min_z);
        values.extend(self.max_z);
        if values.iter().any(|v| !v.is_finite()) {
            return Err(GeoqueryError::field_validation("bbox", "bbox values must be finite"));
        }
        if self.min_x > self.max_x {
            return Err(GeoqueryError::field_validation(
                "bbox",
                format!("minx ({}) is greater than maxx ({})", self.min_x, self.max_x),
            ));
        }
        if self.min_y > self.max_y {
            return Err(GeoqueryError::field_validation(
                "bbox",
                format!("miny ({}) is greater than maxy ({})", self.min_y, self.max_y),
            ));
        }
        if let (Some(min_z), Some(max_z)) = (self.min_z, self.max_z) {
            if min_z > max_z {
                return Err(GeoqueryError::field_validation(
                    "bbox",
                    format!("minz ({}) is greater than maxz ({})", min_z, max_z),
                ));
            }
        }
        Ok(())
    }

    /// Check if two bounding boxes intersect
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        let x_overlap = self.min_x <= other.max_x && self.max_x >= other.min_x;
        let y_overlap = self.min_y <= other.max_y && self.max_y >= other.min_y;
        x_overlap && y_overlap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_forms_normalize() {
        for raw in [
            "EPSG:4326",
            "epsg:4326",
            "4326",
            "urn:ogc:def:crs:EPSG::4326",
            "urn:ogc:def:crs:EPSG:6.6:4326",
            "http://www.opengis.net/def/crs/EPSG/0/4326",
            "http://www.opengis.net/gml/srs/epsg.xml#4326",
            "http://www.opengis.net/def/crs/OGC/1.3/CRS84",
            "CRS84",
        ] {
            assert_eq!(Crs::parse(raw).unwrap(), Crs::wgs84(), "{}", raw);
        }
        assert_eq!(Crs::parse("EPSG:900913").unwrap(), Crs::web_mercator());
        assert_eq!(Crs::wgs84().to_string(), "EPSG:4326");
    }

    #[test]
    fn test_crs_rejects_garbage() {
        assert!(Crs::parse("").is_err());
        assert!(Crs::parse("EPSG:abc").is_err());
        assert!(Crs::parse("http://example.com/crs").is_err());
    }

    #[test]
    fn test_distance_conversion() {
        assert!((DistanceUnit::Miles.to_meters(1.0) - 1609.344).abs() < 1e-9);
        assert!((DistanceUnit::Feet.to_meters(1.0) - 0.3048).abs() < 1e-9);
        assert!((DistanceUnit::Yards.to_meters(1.0) - 0.9144).abs() < 1e-9);
        assert!((DistanceUnit::NauticalMiles.to_meters(1.0) - 1852.0).abs() < 1e-9);
        assert!((Distance::new(5.0, DistanceUnit::Kilometers).to_meters() - 5000.0).abs() < 1e-9);
        assert!((DistanceUnit::Miles.from_meters(1609.344) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_tokens() {
        assert_eq!(DistanceUnit::from_token("meter"), Some(DistanceUnit::Meters));
        assert_eq!(DistanceUnit::from_token("Nautical Mile"), Some(DistanceUnit::NauticalMiles));
        assert_eq!(DistanceUnit::from_token("nautical_miles"), Some(DistanceUnit::NauticalMiles));
        assert_eq!(DistanceUnit::from_token("urn:ogc:def:uom:EPSG::9001"), Some(DistanceUnit::Meters));
        assert_eq!(DistanceUnit::from_token("furlong"), None);
    }

    #[test]
    fn test_bounding_box_order_enforced() {
        assert!(BoundingBox::new(-10.0, 40.0, 10.0, 60.0).is_ok());
        assert!(BoundingBox::new(10.0, 40.0, -10.0, 60.0).is_err());
        assert!(BoundingBox::new_3d([0.0, 0.0, 5.0], [1.0, 1.0, 2.0]).is_err());
    }

    #[test]
    fn test_geometry_bounding_box_and_counts() {
        let polygon = Geometry::new(
            Shape::Polygon(vec![
                vec![
                    Coordinate::new(0.0, 0.0),
                    Coordinate::new(4.0, 0.0),
                    Coordinate::new(4.0, 3.0),
                    Coordinate::new(0.0, 3.0),
                    Coordinate::new(0.0, 0.0),
                ],
                vec![
                    Coordinate::new(1.0, 1.0),
                    Coordinate::new(1.0, 2.0),
                    Coordinate::new(2.0, 2.0),
                    Coordinate::new(1.0, 1.0),
                ],
            ]),
            Crs::wgs84(),
        );
        let bbox = polygon.bounding_box().unwrap();
        assert_eq!((bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y), (0.0, 0.0, 4.0, 3.0));
        assert_eq!(bbox.crs, Some(Crs::wgs84()));
        assert_eq!(polygon.vertex_count(), 9);
        assert_eq!(polygon.shape.ring_count(), 2);
    }

    #[test]
    fn test_envelope_serializes_as_polygon() {
        let bbox = BoundingBox::new(-10.0, 40.0, 10.0, 60.0).unwrap();
        let json = Geometry::envelope(&bbox, Crs::wgs84()).to_geojson();
        assert_eq!(json["type"], "Polygon");
        assert_eq!(json["coordinates"][0].as_array().unwrap().len(), 5);
    }
}
