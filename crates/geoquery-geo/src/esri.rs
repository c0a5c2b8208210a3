//! Esri JSON geometries as used by GeoServices REST `geometry` parameters

use crate::models::{Coordinate, Crs, Shape};
use geo::Winding;
use geoquery_core::error::{GeoqueryError, Result};
use serde_json::Value as JsonValue;

/// Esri well-known IDs that alias EPSG codes
fn wkid_to_crs(wkid: u64) -> Result<Crs> {
    let epsg = match wkid {
        102100 | 102113 | 900913 => 3857,
        other => u32::try_from(other).map_err(|_| {
            GeoqueryError::parse(format!("Unsupported wkid {}", other), "spatialReference")
        })?,
    };
    Ok(Crs::new(epsg))
}

/// Read the `spatialReference` member, preferring `latestWkid`
pub fn spatial_reference(value: &JsonValue) -> Result<Option<Crs>> {
    let Some(reference) = value.get("spatialReference") else {
        return Ok(None);
    };
    let wkid = reference
        .get("latestWkid")
        .and_then(JsonValue::as_u64)
        .or_else(|| reference.get("wkid").and_then(JsonValue::as_u64));
    wkid.map(wkid_to_crs).transpose()
}

/// Read an Esri JSON geometry, or the `xmin,ymin,xmax,ymax` shorthand
pub fn read_esri(raw: &str) -> Result<(Shape, Option<Crs>)> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return read_envelope_shorthand(trimmed).map(|shape| (shape, None));
    }

    let value: JsonValue = serde_json::from_str(trimmed).map_err(|e| {
        GeoqueryError::parse(format!("Invalid Esri JSON geometry: {}", e), "geometry")
    })?;
    let crs = spatial_reference(&value)?;
    Ok((read_esri_value(&value)?, crs))
}

fn number(value: &JsonValue, key: &str) -> Option<f64> {
    value.get(key).and_then(JsonValue::as_f64)
}

fn point(value: &JsonValue) -> Result<Coordinate> {
    let items = value
        .as_array()
        .ok_or_else(|| GeoqueryError::parse("Esri position must be an array", "geometry"))?;
    let numbers: Vec<f64> = items.iter().filter_map(JsonValue::as_f64).collect();
    match numbers.as_slice() {
        [x, y] => Ok(Coordinate::new(*x, *y)),
        [x, y, z, ..] => Ok(Coordinate::with_z(*x, *y, *z)),
        _ => Err(GeoqueryError::parse("Esri position needs at least 2 numbers", "geometry")),
    }
}

fn path(value: &JsonValue) -> Result<Vec<Coordinate>> {
    value
        .as_array()
        .ok_or_else(|| GeoqueryError::parse("Esri path must be an array", "geometry"))?
        .iter()
        .map(point)
        .collect()
}

fn paths(value: &JsonValue) -> Result<Vec<Vec<Coordinate>>> {
    value
        .as_array()
        .ok_or_else(|| GeoqueryError::parse("Esri paths must be an array", "geometry"))?
        .iter()
        .map(path)
        .collect()
}

/// Convert an already decoded Esri geometry object
pub fn read_esri_value(value: &JsonValue) -> Result<Shape> {
    if let (Some(x), Some(y)) = (number(value, "x"), number(value, "y")) {
        return Ok(Shape::Point(match number(value, "z") {
            Some(z) => Coordinate::with_z(x, y, z),
            None => Coordinate::new(x, y),
        }));
    }

    if let (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) = (
        number(value, "xmin"),
        number(value, "ymin"),
        number(value, "xmax"),
        number(value, "ymax"),
    ) {
        return Ok(Shape::Envelope {
            min: Coordinate::new(min_x, min_y),
            max: Coordinate::new(max_x, max_y),
        });
    }

    if let Some(points) = value.get("points") {
        return Ok(Shape::MultiPoint(path(points)?));
    }

    if let Some(value) = value.get("paths") {
        let mut lines = paths(value)?;
        return Ok(if lines.len() == 1 {
            Shape::LineString(lines.remove(0))
        } else {
            Shape::MultiLineString(lines)
        });
    }

    if let Some(value) = value.get("rings") {
        return Ok(group_rings(paths(value)?));
    }

    Err(GeoqueryError::parse(
        "Unrecognized Esri geometry: expected x/y, points, paths, rings or an envelope",
        "geometry",
    ))
}

/// Esri polygons are a flat list of rings: clockwise rings are shells and
/// counter-clockwise rings are holes of the preceding shell. Rings are
/// reversed into the counter-clockwise-shell convention.
fn group_rings(rings: Vec<Vec<Coordinate>>) -> Shape {
    let mut polygons: Vec<Vec<Vec<Coordinate>>> = Vec::new();

    for mut ring in rings {
        let line = geo::LineString::new(ring.iter().map(|c| geo::Coord { x: c.x, y: c.y }).collect());
        let is_shell = line.is_cw() || polygons.is_empty();
        ring.reverse();
        match polygons.last_mut() {
            Some(polygon) if !is_shell => polygon.push(ring),
            _ => polygons.push(vec![ring]),
        }
    }

    if polygons.len() == 1 {
        Shape::Polygon(polygons.remove(0))
    } else {
        Shape::MultiPolygon(polygons)
    }
}

fn read_envelope_shorthand(raw: &str) -> Result<Shape> {
    let numbers: Vec<f64> = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| GeoqueryError::parse(format!("Invalid envelope '{}'", raw), "geometry"))?;

    match numbers.as_slice() {
        [min_x, min_y, max_x, max_y] => Ok(Shape::Envelope {
            min: Coordinate::new(*min_x, *min_y),
            max: Coordinate::new(*max_x, *max_y),
        }),
        [x, y] => Ok(Shape::Point(Coordinate::new(*x, *y))),
        _ => Err(GeoqueryError::parse(
            format!("Envelope shorthand needs 4 numbers, found {}", numbers.len()),
            "geometry",
        )),
    }
}
