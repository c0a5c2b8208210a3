//! GeoJSON geometry reader built on the `geojson` crate

use crate::models::{Coordinate, Shape};
use geoquery_core::error::{GeoqueryError, Result};
use serde_json::Value as JsonValue;

/// A GeoJSON geometry plus the legacy `crs` member name, if any
#[derive(Debug, Clone, PartialEq)]
pub struct GeoJsonShape {
    pub shape: Shape,
    pub crs_name: Option<String>,
}

/// Read a GeoJSON geometry object
///
/// Features are unwrapped to their geometry. A bare `{"bbox": [...]}` object
/// (as used in CQL2-JSON spatial literals) becomes an envelope.
pub fn read_geojson(value: &JsonValue) -> Result<GeoJsonShape> {
    let object = value
        .as_object()
        .ok_or_else(|| GeoqueryError::parse("GeoJSON geometry must be an object", "geometry"))?;

    let crs_name = object
        .get("crs")
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    if object.get("type").is_none() {
        if let Some(bbox) = object.get("bbox") {
            return Ok(GeoJsonShape { shape: read_bbox(bbox)?, crs_name });
        }
    }

    if object.get("type").and_then(JsonValue::as_str) == Some("Feature") {
        let geometry = object
            .get("geometry")
            .filter(|g| !g.is_null())
            .ok_or_else(|| GeoqueryError::parse("Feature has no geometry", "geometry"))?;
        let inner = read_geojson(geometry)?;
        return Ok(GeoJsonShape { crs_name: crs_name.or(inner.crs_name), ..inner });
    }

    let geometry = geojson::Geometry::from_json_value(value.clone()).map_err(|e| {
        GeoqueryError::parse(format!("Invalid GeoJSON geometry: {}", e), "geometry")
    })?;

    Ok(GeoJsonShape { shape: convert(&geometry.value)?, crs_name })
}

/// Read a `[minx, miny, maxx, maxy]` or 6-number bbox array
pub fn read_bbox(value: &JsonValue) -> Result<Shape> {
    let numbers: Option<Vec<f64>> =
        value.as_array().map(|items| items.iter().filter_map(JsonValue::as_f64).collect());

    match numbers.as_deref() {
        Some([min_x, min_y, max_x, max_y]) => Ok(Shape::Envelope {
            min: Coordinate::new(*min_x, *min_y),
            max: Coordinate::new(*max_x, *max_y),
        }),
        Some([min_x, min_y, min_z, max_x, max_y, max_z]) => Ok(Shape::Envelope {
            min: Coordinate::with_z(*min_x, *min_y, *min_z),
            max: Coordinate::with_z(*max_x, *max_y, *max_z),
        }),
        _ => Err(GeoqueryError::parse("bbox must contain 4 or 6 numbers", "bbox")),
    }
}

fn position(p: &[f64]) -> Result<Coordinate> {
    match p {
        [x, y] => Ok(Coordinate::new(*x, *y)),
        [x, y, z, ..] => Ok(Coordinate::with_z(*x, *y, *z)),
        _ => Err(GeoqueryError::parse(
            format!("Position must have at least 2 values, found {}", p.len()),
            "coordinates",
        )),
    }
}

fn positions(line: &[Vec<f64>]) -> Result<Vec<Coordinate>> {
    line.iter().map(|p| position(p)).collect()
}

fn rings(rings: &[Vec<Vec<f64>>]) -> Result<Vec<Vec<Coordinate>>> {
    rings.iter().map(|r| positions(r)).collect()
}

fn convert(value: &geojson::Value) -> Result<Shape> {
    let shape = match value {
        geojson::Value::Point(p) => Shape::Point(position(p)?),
        geojson::Value::MultiPoint(points) => Shape::MultiPoint(positions(points)?),
        geojson::Value::LineString(line) => Shape::LineString(positions(line)?),
        geojson::Value::MultiLineString(lines) => Shape::MultiLineString(rings(lines)?),
        geojson::Value::Polygon(polygon) => Shape::Polygon(rings(polygon)?),
        geojson::Value::MultiPolygon(polygons) => Shape::MultiPolygon(
            polygons.iter().map(|p| rings(p)).collect::<Result<Vec<_>>>()?,
        ),
        geojson::Value::GeometryCollection(geometries) => Shape::GeometryCollection(
            geometries.iter().map(|g| convert(&g.value)).collect::<Result<Vec<_>>>()?,
        ),
    };
    Ok(shape)
}
