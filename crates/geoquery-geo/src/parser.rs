//! Geometry parsing entry points
//!
//! A [`GeometryParser`] is created per request. Every geometry it parses is
//! validated (and in lenient mode repaired) and counted against the
//! request's aggregate vertex budget.

use crate::crs::resolve_crs;
use crate::esri::{read_esri, read_esri_value, spatial_reference};
use crate::gml::read_gml;
use crate::json::read_geojson;
use crate::models::{BoundingBox, Crs, Geometry, Shape, ValidityMode};
use crate::text::read_wkt;
use crate::validation::{validate_and_repair, VertexLimit};
use crate::xml::XmlElement;
use geoquery_core::error::{GeoqueryError, Result};
use geoquery_core::models::{ParserLimits, ServicePolicy};
use serde_json::Value as JsonValue;
use std::cell::Cell;

/// Element nesting allowed in a standalone GML document
pub const MAX_XML_DEPTH: usize = 64;

/// A validated geometry plus its derived envelope
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedGeometry {
    pub geometry: Geometry,
    pub bbox: Option<BoundingBox>,
    /// Whether lenient-mode repair changed the input
    pub repaired: bool,
}

/// Per-request geometry parser
#[derive(Debug)]
pub struct GeometryParser {
    mode: ValidityMode,
    limits: ParserLimits,
    default_crs: Option<Crs>,
    consumed: Cell<usize>,
}

impl Default for GeometryParser {
    fn default() -> Self {
        Self::new(ValidityMode::default(), ParserLimits::default())
    }
}

impl GeometryParser {
    pub fn new(mode: ValidityMode, limits: ParserLimits) -> Self {
        Self { mode, limits, default_crs: None, consumed: Cell::new(0) }
    }

    /// Parser configured from the service policy snapshot
    pub fn from_policy(policy: &ServicePolicy) -> Self {
        Self::new(policy.geometry_validity, policy.parser).with_default_crs(policy.default_crs)
    }

    /// CRS applied to geometries that do not declare one
    pub fn with_default_crs(mut self, crs: Option<Crs>) -> Self {
        self.default_crs = crs;
        self
    }

    pub fn mode(&self) -> ValidityMode {
        self.mode
    }

    pub fn default_crs(&self) -> Option<Crs> {
        self.default_crs
    }

    /// Vertices accepted so far by this parser
    pub fn consumed_vertices(&self) -> usize {
        self.consumed.get()
    }

    /// Detect the encoding from the first character and parse
    ///
    /// `<` is GML, `{` is GeoJSON or Esri JSON, anything else is WKT, with a
    /// bare list of numbers read as an Esri envelope shorthand.
    pub fn parse(&self, raw: &str) -> Result<ParsedGeometry> {
        let trimmed = raw.trim_start();
        match trimmed.chars().next() {
            Some('<') => self.parse_gml(trimmed),
            Some('{') => {
                let value: JsonValue = serde_json::from_str(trimmed).map_err(|e| {
                    GeoqueryError::parse(format!("Invalid JSON geometry: {}", e), "geometry")
                })?;
                if is_esri_object(&value) {
                    self.parse_esri_value(&value)
                } else {
                    self.parse_geojson_value(&value)
                }
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                self.parse_esri(trimmed)
            }
            Some(_) => self.parse_wkt(trimmed),
            None => Err(GeoqueryError::parse("Empty geometry", "geometry")),
        }
    }

    /// Parse a standalone GML document
    pub fn parse_gml(&self, xml: &str) -> Result<ParsedGeometry> {
        let root = XmlElement::parse(xml, MAX_XML_DEPTH)?;
        self.parse_gml_element(&root)
    }

    /// Parse a GML geometry element embedded in a larger document
    pub fn parse_gml_element(&self, element: &XmlElement) -> Result<ParsedGeometry> {
        let geometry = read_gml(element, self.default_crs)?;
        self.finish(geometry)
    }

    pub fn parse_geojson(&self, json: &str) -> Result<ParsedGeometry> {
        let value: JsonValue = serde_json::from_str(json).map_err(|e| {
            GeoqueryError::parse(format!("Invalid GeoJSON: {}", e), "geometry")
        })?;
        self.parse_geojson_value(&value)
    }

    /// Parse an already decoded GeoJSON geometry, feature or bbox literal
    pub fn parse_geojson_value(&self, value: &JsonValue) -> Result<ParsedGeometry> {
        let parsed = read_geojson(value)?;
        let crs = resolve_crs(parsed.crs_name.as_deref(), self.default_crs)?;
        self.finish(Geometry::new(parsed.shape, crs))
    }

    /// Parse an Esri JSON geometry or `xmin,ymin,xmax,ymax` shorthand
    pub fn parse_esri(&self, raw: &str) -> Result<ParsedGeometry> {
        let (shape, crs) = read_esri(raw)?;
        self.finish_with(shape, crs)
    }

    fn parse_esri_value(&self, value: &JsonValue) -> Result<ParsedGeometry> {
        let crs = spatial_reference(value)?;
        self.finish_with(read_esri_value(value)?, crs)
    }

    /// Parse WKT or EWKT
    pub fn parse_wkt(&self, text: &str) -> Result<ParsedGeometry> {
        let (shape, srid) = read_wkt(text)?;
        self.finish_with(shape, srid)
    }

    /// Validate a geometry built by the caller, e.g. a BBOX envelope
    pub fn accept(&self, geometry: Geometry) -> Result<ParsedGeometry> {
        self.finish(geometry)
    }

    fn finish_with(&self, shape: Shape, crs: Option<Crs>) -> Result<ParsedGeometry> {
        let crs = crs.or(self.default_crs).unwrap_or_else(Crs::wgs84);
        self.finish(Geometry::new(shape, crs))
    }

    fn finish(&self, geometry: Geometry) -> Result<ParsedGeometry> {
        let limit = VertexLimit {
            per_geometry: self.limits.max_geometry_vertices,
            remaining: self.limits.max_total_vertices.saturating_sub(self.consumed.get()),
        };
        let (geometry, repaired) = validate_and_repair(geometry, limit, self.mode)?;

        self.consumed.set(self.consumed.get() + geometry.vertex_count());
        let bbox = geometry.bounding_box();

        tracing::debug!(
            geometry_type = ?geometry.geometry_type(),
            crs = %geometry.crs,
            vertices = geometry.vertex_count(),
            repaired,
            "Parsed geometry"
        );

        Ok(ParsedGeometry { geometry, bbox, repaired })
    }
}

fn is_esri_object(value: &JsonValue) -> bool {
    value.get("type").is_none()
        && ["x", "points", "paths", "rings", "xmin"].iter().any(|key| value.get(key).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinate;

    #[test]
    fn test_autodetect() {
        let parser = GeometryParser::default();
        let gml = parser
            .parse(r#"<gml:Point srsName="EPSG:4326"><gml:pos>1 2</gml:pos></gml:Point>"#)
            .unwrap();
        assert_eq!(gml.geometry.shape, Shape::Point(Coordinate::new(1.0, 2.0)));

        let json = parser.parse(r#"{"type":"Point","coordinates":[1,2]}"#).unwrap();
        assert_eq!(json.geometry, gml.geometry);

        let esri = parser.parse(r#"{"x":1,"y":2}"#).unwrap();
        assert_eq!(esri.geometry, gml.geometry);

        let wkt = parser.parse("POINT(1 2)").unwrap();
        assert_eq!(wkt.geometry, gml.geometry);

        let envelope = parser.parse("-10,40,10,60").unwrap();
        assert_eq!(envelope.bbox.unwrap().min_x, -10.0);
    }

    #[test]
    fn test_default_crs_applies() {
        let parser = GeometryParser::default().with_default_crs(Some(Crs::web_mercator()));
        let parsed = parser.parse_wkt("POINT(100000 200000)").unwrap();
        assert_eq!(parsed.geometry.crs, Crs::web_mercator());
        assert_eq!(parsed.bbox.unwrap().crs, Some(Crs::web_mercator()));
    }

    #[test]
    fn test_aggregate_budget_spans_geometries() {
        let limits = ParserLimits { max_total_vertices: 8, ..ParserLimits::default() };
        let parser = GeometryParser::new(ValidityMode::Lenient, limits);
        let square = "POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))";

        parser.parse_wkt(square).unwrap();
        assert_eq!(parser.consumed_vertices(), 5);
        let err = parser.parse_wkt(square).unwrap_err();
        assert!(err.to_string().contains("budget"), "{}", err);
    }

    #[test]
    fn test_bbox_is_derived() {
        let parser = GeometryParser::default();
        let parsed = parser
            .parse_geojson(r#"{"type":"LineString","coordinates":[[0,0],[3,-2],[1,5]]}"#)
            .unwrap();
        let bbox = parsed.bbox.unwrap();
        assert_eq!((bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y), (0.0, -2.0, 3.0, 5.0));
        assert!(!parsed.repaired);
    }

    #[test]
    fn test_empty_input() {
        assert!(GeometryParser::default().parse("   ").is_err());
    }
}
