//! GML 3.2 and GML 2.x geometry reader
//!
//! Works on the hardened element tree from [`crate::xml`]. The `srsName` of
//! the outermost geometry (or the first member that declares one) sets the
//! CRS of the whole geometry; latitude-first CRS identifiers are swapped to
//! x = longitude.

use crate::crs::{is_lat_lon_order, resolve_crs, swap_axes};
use crate::models::{Coordinate, Crs, Geometry, Shape};
use crate::xml::XmlElement;
use geoquery_core::error::{GeoqueryError, Result};

/// Read a GML geometry element
pub fn read_gml(element: &XmlElement, default_crs: Option<Crs>) -> Result<Geometry> {
    let srs_name = find_srs_name(element);
    let crs = resolve_crs(srs_name, default_crs)?;

    let dimension = element
        .attribute("srsDimension")
        .map(|raw| parse_dimension(raw, element))
        .transpose()?
        .unwrap_or(2);

    let mut shape = read_shape(element, dimension)?;
    if srs_name.is_some_and(|raw| is_lat_lon_order(raw, &crs)) {
        swap_axes(&mut shape);
    }

    Ok(Geometry::new(shape, crs))
}

/// Whether an element name is a GML geometry this reader understands
pub fn is_geometry_element(name: &str) -> bool {
    matches!(
        name,
        "Point"
            | "LineString"
            | "LinearRing"
            | "Curve"
            | "Polygon"
            | "Surface"
            | "Envelope"
            | "Box"
            | "MultiPoint"
            | "MultiLineString"
            | "MultiCurve"
            | "MultiPolygon"
            | "MultiSurface"
            | "MultiGeometry"
            | "GeometryCollection"
    )
}

fn find_srs_name(element: &XmlElement) -> Option<&str> {
    element
        .attribute("srsName")
        .or_else(|| element.children.iter().find_map(find_srs_name))
}

fn locator(element: &XmlElement) -> String {
    format!("gml:{}", element.name)
}

fn parse_dimension(raw: &str, element: &XmlElement) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(dim @ 2..=3) => Ok(dim),
        _ => Err(GeoqueryError::parse(
            format!("srsDimension must be 2 or 3, found '{}'", raw),
            locator(element),
        )),
    }
}

fn read_shape(element: &XmlElement, dimension: usize) -> Result<Shape> {
    match element.name.as_str() {
        "Point" => Ok(Shape::Point(read_single(element, dimension)?)),
        "LineString" | "LinearRing" => Ok(Shape::LineString(read_sequence(element, dimension)?)),
        "Curve" => Ok(Shape::LineString(read_curve(element, dimension)?)),
        "Polygon" => Ok(Shape::Polygon(read_polygon(element, dimension)?)),
        "Surface" => read_surface(element, dimension),
        "Envelope" => read_envelope(element, dimension),
        "Box" => read_box(element),
        "MultiPoint" => {
            let points = members(element, &["pointMember", "pointMembers"])
                .map(|point| read_single(point, dimension))
                .collect::<Result<Vec<_>>>()?;
            Ok(Shape::MultiPoint(points))
        }
        "MultiLineString" | "MultiCurve" => {
            let lines = members(element, &["lineStringMember", "curveMember", "curveMembers"])
                .map(|line| match read_shape(line, dimension)? {
                    Shape::LineString(coords) => Ok(coords),
                    _ => Err(unexpected_member(line, element)),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Shape::MultiLineString(lines))
        }
        "MultiPolygon" | "MultiSurface" => {
            let mut polygons = Vec::new();
            for member in members(element, &["polygonMember", "surfaceMember", "surfaceMembers"]) {
                match read_shape(member, dimension)? {
                    Shape::Polygon(rings) => polygons.push(rings),
                    Shape::MultiPolygon(nested) => polygons.extend(nested),
                    _ => return Err(unexpected_member(member, element)),
                }
            }
            Ok(Shape::MultiPolygon(polygons))
        }
        "MultiGeometry" | "GeometryCollection" => {
            let shapes = members(element, &["geometryMember", "geometryMembers"])
                .map(|member| read_shape(member, dimension))
                .collect::<Result<Vec<_>>>()?;
            Ok(Shape::GeometryCollection(shapes))
        }
        other => Err(GeoqueryError::parse(
            format!("Unsupported GML geometry element '{}'", other),
            format!("gml:{}", other),
        )),
    }
}

fn unexpected_member(member: &XmlElement, parent: &XmlElement) -> GeoqueryError {
    GeoqueryError::parse(
        format!("<{}> is not a valid member of <{}>", member.name, parent.name),
        locator(member),
    )
}

/// Geometry children of the named member properties
fn members<'a>(
    element: &'a XmlElement,
    properties: &'a [&'a str],
) -> impl Iterator<Item = &'a XmlElement> {
    element
        .children
        .iter()
        .filter(move |child| properties.contains(&child.name.as_str()))
        .flat_map(|property| property.children.iter())
}

fn parse_number(token: &str, element: &XmlElement) -> Result<f64> {
    token.trim().parse::<f64>().map_err(|_| {
        GeoqueryError::parse(format!("Invalid coordinate value '{}'", token), locator(element))
    })
}

fn coordinate_from(values: &[f64], element: &XmlElement) -> Result<Coordinate> {
    match values {
        [x, y] => Ok(Coordinate::new(*x, *y)),
        [x, y, z] => Ok(Coordinate::with_z(*x, *y, *z)),
        _ => Err(GeoqueryError::parse(
            format!("Expected 2 or 3 ordinates, found {}", values.len()),
            locator(element),
        )),
    }
}

fn read_pos(element: &XmlElement) -> Result<Coordinate> {
    let values = element
        .text()
        .split_whitespace()
        .map(|token| parse_number(token, element))
        .collect::<Result<Vec<_>>>()?;
    coordinate_from(&values, element)
}

fn read_pos_list(element: &XmlElement, dimension: usize) -> Result<Vec<Coordinate>> {
    let dimension = match element.attribute("srsDimension") {
        Some(raw) => parse_dimension(raw, element)?,
        None => dimension,
    };
    let values = element
        .text()
        .split_whitespace()
        .map(|token| parse_number(token, element))
        .collect::<Result<Vec<_>>>()?;

    if values.len() % dimension != 0 {
        return Err(GeoqueryError::parse(
            format!(
                "posList has {} values, which is not a multiple of dimension {}",
                values.len(),
                dimension
            ),
            locator(element),
        ));
    }
    values.chunks(dimension).map(|chunk| coordinate_from(chunk, element)).collect()
}

/// GML 2 `coordinates`, honouring the `cs`, `ts` and `decimal` attributes
fn read_coordinates(element: &XmlElement) -> Result<Vec<Coordinate>> {
    let cs = element.attribute("cs").unwrap_or(",");
    let ts = element.attribute("ts").unwrap_or(" ");
    let decimal = element.attribute("decimal").unwrap_or(".");

    let text = element.text();
    let tuples: Vec<&str> = if ts.trim().is_empty() {
        text.split_whitespace().collect()
    } else {
        text.split(ts).map(str::trim).filter(|t| !t.is_empty()).collect()
    };

    tuples
        .into_iter()
        .map(|tuple| {
            let values = tuple
                .split(cs)
                .map(|token| {
                    if decimal == "." {
                        parse_number(token, element)
                    } else {
                        parse_number(&token.replace(decimal, "."), element)
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            coordinate_from(&values, element)
        })
        .collect()
}

/// GML 2 `coord` with `X`, `Y` and optional `Z` children
fn read_coord(element: &XmlElement) -> Result<Coordinate> {
    let axis = |name: &str| -> Result<Option<f64>> {
        element.child(name).map(|child| parse_number(child.text(), child)).transpose()
    };
    match (axis("X")?, axis("Y")?, axis("Z")?) {
        (Some(x), Some(y), Some(z)) => Ok(Coordinate::with_z(x, y, z)),
        (Some(x), Some(y), None) => Ok(Coordinate::new(x, y)),
        _ => Err(GeoqueryError::parse("coord requires X and Y", locator(element))),
    }
}

fn read_sequence(element: &XmlElement, dimension: usize) -> Result<Vec<Coordinate>> {
    if let Some(list) = element.child("posList") {
        return read_pos_list(list, dimension);
    }
    if let Some(coordinates) = element.child("coordinates") {
        return read_coordinates(coordinates);
    }

    let mut coords = Vec::new();
    for child in &element.children {
        match child.name.as_str() {
            "pos" => coords.push(read_pos(child)?),
            "coord" => coords.push(read_coord(child)?),
            "pointProperty" | "pointRep" => {
                if let Some(point) = child.child("Point") {
                    coords.push(read_single(point, dimension)?);
                }
            }
            _ => {}
        }
    }

    if coords.is_empty() {
        return Err(GeoqueryError::parse(
            format!("<{}> has no coordinates", element.name),
            locator(element),
        ));
    }
    Ok(coords)
}

fn read_single(element: &XmlElement, dimension: usize) -> Result<Coordinate> {
    let coords = read_sequence(element, dimension)?;
    match coords.as_slice() {
        [single] => Ok(*single),
        _ => Err(GeoqueryError::parse(
            format!("Point must have exactly one position, found {}", coords.len()),
            locator(element),
        )),
    }
}

/// Concatenate `LineStringSegment`s, dropping the repeated joint positions
fn read_curve(element: &XmlElement, dimension: usize) -> Result<Vec<Coordinate>> {
    let segments = element
        .child("segments")
        .ok_or_else(|| GeoqueryError::parse("Curve has no segments", locator(element)))?;

    let mut coords: Vec<Coordinate> = Vec::new();
    for segment in &segments.children {
        for coord in read_sequence(segment, dimension)? {
            if coords.last().is_some_and(|last| last.same_xy(&coord)) {
                continue;
            }
            coords.push(coord);
        }
    }
    Ok(coords)
}

fn read_ring(property: &XmlElement, dimension: usize) -> Result<Vec<Coordinate>> {
    let ring = property.children.first().ok_or_else(|| {
        GeoqueryError::parse(format!("<{}> has no ring", property.name), locator(property))
    })?;
    match ring.name.as_str() {
        "LinearRing" | "LineString" => read_sequence(ring, dimension),
        "Ring" => {
            let mut coords = Vec::new();
            for curve in members(ring, &["curveMember"]) {
                let part = match curve.name.as_str() {
                    "Curve" => read_curve(curve, dimension)?,
                    _ => read_sequence(curve, dimension)?,
                };
                for coord in part {
                    if coords.last().is_some_and(|last: &Coordinate| last.same_xy(&coord)) {
                        continue;
                    }
                    coords.push(coord);
                }
            }
            Ok(coords)
        }
        other => Err(GeoqueryError::parse(
            format!("Unsupported ring element '{}'", other),
            format!("gml:{}", other),
        )),
    }
}

fn read_polygon(element: &XmlElement, dimension: usize) -> Result<Vec<Vec<Coordinate>>> {
    let exterior = element
        .child("exterior")
        .or_else(|| element.child("outerBoundaryIs"))
        .ok_or_else(|| GeoqueryError::parse("Polygon has no exterior ring", locator(element)))?;

    let mut rings = vec![read_ring(exterior, dimension)?];
    for interior in element
        .children
        .iter()
        .filter(|c| c.name == "interior" || c.name == "innerBoundaryIs")
    {
        rings.push(read_ring(interior, dimension)?);
    }
    Ok(rings)
}

fn read_surface(element: &XmlElement, dimension: usize) -> Result<Shape> {
    let patches = element
        .child("patches")
        .ok_or_else(|| GeoqueryError::parse("Surface has no patches", locator(element)))?;
    let mut polygons = patches
        .children
        .iter()
        .map(|patch| read_polygon(patch, dimension))
        .collect::<Result<Vec<_>>>()?;

    match polygons.len() {
        0 => Err(GeoqueryError::parse("Surface has no patches", locator(element))),
        1 => Ok(Shape::Polygon(polygons.remove(0))),
        _ => Ok(Shape::MultiPolygon(polygons)),
    }
}

fn read_envelope(element: &XmlElement, dimension: usize) -> Result<Shape> {
    let corners = match (element.child("lowerCorner"), element.child("upperCorner")) {
        (Some(lower), Some(upper)) => vec![read_pos(lower)?, read_pos(upper)?],
        _ => read_sequence(element, dimension)?,
    };
    envelope_from(corners, element)
}

fn read_box(element: &XmlElement) -> Result<Shape> {
    let corners = match element.child("coordinates") {
        Some(coordinates) => read_coordinates(coordinates)?,
        None => element.children_named("coord").map(read_coord).collect::<Result<Vec<_>>>()?,
    };
    envelope_from(corners, element)
}

fn envelope_from(corners: Vec<Coordinate>, element: &XmlElement) -> Result<Shape> {
    match corners.as_slice() {
        [min, max] => Ok(Shape::Envelope { min: *min, max: *max }),
        _ => Err(GeoqueryError::parse(
            format!("{} needs exactly two corners, found {}", element.name, corners.len()),
            locator(element),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Result<Geometry> {
        read_gml(&XmlElement::parse(xml, 64)?, None)
    }

    #[test]
    fn test_point_pos_lon_lat() {
        let geom = parse(r#"<gml:Point xmlns:gml="http://www.opengis.net/gml/3.2" srsName="EPSG:4326"><gml:pos>5.1 52.3</gml:pos></gml:Point>"#).unwrap();
        assert_eq!(geom.shape, Shape::Point(Coordinate::new(5.1, 52.3)));
        assert_eq!(geom.crs, Crs::wgs84());
    }

    #[test]
    fn test_urn_swaps_axes() {
        let geom = parse(r#"<gml:Point srsName="urn:ogc:def:crs:EPSG::4326"><gml:pos>52.3 5.1</gml:pos></gml:Point>"#).unwrap();
        assert_eq!(geom.shape, Shape::Point(Coordinate::new(5.1, 52.3)));
    }

    #[test]
    fn test_pos_list_with_dimension() {
        let geom = parse(
            r#"<gml:LineString srsName="EPSG:3857"><gml:posList srsDimension="3">0 0 1 10 10 2</gml:posList></gml:LineString>"#,
        )
        .unwrap();
        assert_eq!(
            geom.shape,
            Shape::LineString(vec![Coordinate::with_z(0.0, 0.0, 1.0), Coordinate::with_z(10.0, 10.0, 2.0)])
        );
        assert_eq!(geom.crs, Crs::web_mercator());

        let err = parse(r#"<gml:LineString><gml:posList>0 0 1</gml:posList></gml:LineString>"#).unwrap_err();
        assert!(err.to_string().contains("gml:posList"), "{}", err);
    }

    #[test]
    fn test_gml2_polygon_with_custom_separators() {
        let geom = parse(
            r#"<gml:Polygon><gml:outerBoundaryIs><gml:LinearRing>
                 <gml:coordinates cs=";" ts="|" decimal=",">0;0|4;0|4;4|0;4|0;0</gml:coordinates>
               </gml:LinearRing></gml:outerBoundaryIs>
               <gml:innerBoundaryIs><gml:LinearRing>
                 <gml:coordinates>1,1 1,2 2,2 1,1</gml:coordinates>
               </gml:LinearRing></gml:innerBoundaryIs></gml:Polygon>"#,
        )
        .unwrap();
        assert_eq!(geom.shape.ring_count(), 2);
        assert_eq!(geom.shape.vertex_count(), 9);
    }

    #[test]
    fn test_decimal_comma() {
        let geom = parse(
            r#"<gml:Point><gml:coordinates cs=" " ts=";" decimal=",">1,5 2,25</gml:coordinates></gml:Point>"#,
        )
        .unwrap();
        assert_eq!(geom.shape, Shape::Point(Coordinate::new(1.5, 2.25)));
    }

    #[test]
    fn test_envelope_and_box() {
        let geom = parse(
            r#"<gml:Envelope srsName="EPSG:4326"><gml:lowerCorner>-10 40</gml:lowerCorner><gml:upperCorner>10 60</gml:upperCorner></gml:Envelope>"#,
        )
        .unwrap();
        assert_eq!(
            geom.shape,
            Shape::Envelope { min: Coordinate::new(-10.0, 40.0), max: Coordinate::new(10.0, 60.0) }
        );

        let geom = parse(
            r#"<gml:Box><gml:coord><gml:X>1</gml:X><gml:Y>2</gml:Y></gml:coord><gml:coord><gml:X>3</gml:X><gml:Y>4</gml:Y></gml:coord></gml:Box>"#,
        )
        .unwrap();
        assert_eq!(
            geom.shape,
            Shape::Envelope { min: Coordinate::new(1.0, 2.0), max: Coordinate::new(3.0, 4.0) }
        );
    }

    #[test]
    fn test_multi_surface_inherits_member_srs() {
        let geom = parse(
            r#"<gml:MultiSurface><gml:surfaceMember><gml:Polygon srsName="http://www.opengis.net/def/crs/EPSG/0/4326">
                 <gml:exterior><gml:LinearRing><gml:posList>0 0 0 1 1 1 0 0</gml:posList></gml:LinearRing></gml:exterior>
               </gml:Polygon></gml:surfaceMember></gml:MultiSurface>"#,
        )
        .unwrap();
        let Shape::MultiPolygon(polygons) = &geom.shape else {
            panic!("expected multipolygon");
        };
        assert_eq!(polygons.len(), 1);
        // lat/lon swapped: (0 1) becomes x=1, y=0
        assert_eq!(polygons[0][0][1], Coordinate::new(1.0, 0.0));
    }

    #[test]
    fn test_curve_segments_join() {
        let geom = parse(
            r#"<gml:Curve><gml:segments>
                 <gml:LineStringSegment><gml:posList>0 0 1 1</gml:posList></gml:LineStringSegment>
                 <gml:LineStringSegment><gml:posList>1 1 2 0</gml:posList></gml:LineStringSegment>
               </gml:segments></gml:Curve>"#,
        )
        .unwrap();
        assert_eq!(geom.shape.vertex_count(), 3);
    }

    #[test]
    fn test_errors_name_element() {
        let err = parse(r#"<gml:Point><gml:pos>1 abc</gml:pos></gml:Point>"#).unwrap_err();
        assert!(err.to_string().contains("gml:pos"), "{}", err);

        let err = parse(r#"<gml:Polygon></gml:Polygon>"#).unwrap_err();
        assert!(err.to_string().contains("gml:Polygon"), "{}", err);

        assert!(parse(r#"<gml:Circle/>"#).is_err());
    }
}
