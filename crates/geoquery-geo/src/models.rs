//! Geometry models for geoquery-geo.
//!
//! This module re-exports canonical types from `geoquery-core` and provides
//! conversions to and from the `geo` crate, which the validation and repair
//! code operates on.

use geo::Geometry as GeoGeometry;
use wkt::ToWkt;

pub use geoquery_core::models::{
    BoundingBox, Coordinate, Crs, Distance, DistanceUnit, Geometry, GeometryType, Shape,
    ValidityMode,
};

fn to_coord(c: &Coordinate) -> geo::Coord {
    geo::Coord { x: c.x, y: c.y }
}

fn to_line(coords: &[Coordinate]) -> geo::LineString {
    geo::LineString::new(coords.iter().map(to_coord).collect())
}

fn to_polygon(rings: &[Vec<Coordinate>]) -> geo::Polygon {
    match rings.split_first() {
        Some((exterior, interiors)) => {
            geo::Polygon::new(to_line(exterior), interiors.iter().map(|r| to_line(r)).collect())
        }
        None => geo::Polygon::new(geo::LineString::new(vec![]), vec![]),
    }
}

/// Convert a canonical shape to a geo::Geometry; z values are dropped
pub fn to_geo_geometry(shape: &Shape) -> GeoGeometry {
    match shape {
        Shape::Point(c) => GeoGeometry::Point(geo::Point(to_coord(c))),
        Shape::LineString(coords) => GeoGeometry::LineString(to_line(coords)),
        Shape::Polygon(rings) => GeoGeometry::Polygon(to_polygon(rings)),
        Shape::MultiPoint(coords) => GeoGeometry::MultiPoint(geo::MultiPoint::new(
            coords.iter().map(|c| geo::Point(to_coord(c))).collect(),
        )),
        Shape::MultiLineString(lines) => GeoGeometry::MultiLineString(geo::MultiLineString::new(
            lines.iter().map(|l| to_line(l)).collect(),
        )),
        Shape::MultiPolygon(polygons) => GeoGeometry::MultiPolygon(geo::MultiPolygon::new(
            polygons.iter().map(|p| to_polygon(p)).collect(),
        )),
        Shape::GeometryCollection(shapes) => GeoGeometry::GeometryCollection(
            geo::GeometryCollection::new_from(shapes.iter().map(to_geo_geometry).collect()),
        ),
        Shape::Envelope { min, max } => {
            GeoGeometry::Rect(geo::Rect::new(to_coord(min), to_coord(max)))
        }
    }
}

fn from_line(line: &geo::LineString) -> Vec<Coordinate> {
    line.coords().map(|c| Coordinate::new(c.x, c.y)).collect()
}

fn from_polygon(polygon: &geo::Polygon) -> Vec<Vec<Coordinate>> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors()).map(from_line).collect()
}

/// Convert a geo::Geometry to a canonical shape
pub fn from_geo_geometry(geom: &GeoGeometry) -> Shape {
    match geom {
        GeoGeometry::Point(p) => Shape::Point(Coordinate::new(p.x(), p.y())),
        GeoGeometry::Line(l) => Shape::LineString(vec![
            Coordinate::new(l.start.x, l.start.y),
            Coordinate::new(l.end.x, l.end.y),
        ]),
        GeoGeometry::LineString(ls) => Shape::LineString(from_line(ls)),
        GeoGeometry::Polygon(p) => Shape::Polygon(from_polygon(p)),
        GeoGeometry::MultiPoint(mp) => {
            Shape::MultiPoint(mp.iter().map(|p| Coordinate::new(p.x(), p.y())).collect())
        }
        GeoGeometry::MultiLineString(mls) => {
            Shape::MultiLineString(mls.iter().map(from_line).collect())
        }
        GeoGeometry::MultiPolygon(mp) => Shape::MultiPolygon(mp.iter().map(from_polygon).collect()),
        GeoGeometry::GeometryCollection(gc) => {
            Shape::GeometryCollection(gc.iter().map(from_geo_geometry).collect())
        }
        GeoGeometry::Rect(r) => Shape::Envelope {
            min: Coordinate::new(r.min().x, r.min().y),
            max: Coordinate::new(r.max().x, r.max().y),
        },
        GeoGeometry::Triangle(t) => Shape::Polygon(from_polygon(&t.to_polygon())),
    }
}

/// Extension trait for Geometry with geo-crate operations
pub trait GeometryExt {
    /// Convert to geo::Geometry
    fn to_geo(&self) -> GeoGeometry;

    /// Well-known text, with envelopes written as polygons
    fn to_wkt(&self) -> String;
}

impl GeometryExt for Geometry {
    fn to_geo(&self) -> GeoGeometry {
        to_geo_geometry(&self.shape)
    }

    fn to_wkt(&self) -> String {
        match self.to_geo() {
            GeoGeometry::Rect(rect) => GeoGeometry::Polygon(rect.to_polygon()).wkt_string(),
            other => other.wkt_string(),
        }
    }
}
