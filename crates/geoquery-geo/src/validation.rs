use crate::crs::outside_domain;
use crate::models::{from_geo_geometry, to_geo_geometry, Coordinate, Geometry, Shape};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::orient::{Direction, Orient};
use geo::{BooleanOps, Winding};
use geoquery_core::error::{GeoqueryError, Result};
use rstar::{RTree, RTreeObject, AABB};

/// Kind of rule a geometry violates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    NonFinite,
    OutOfDomain,
    TooManyVertices,
    TooFewPoints,
    InvalidEnvelope,
    RingClosure,
    Orientation,
    SelfIntersection,
}

impl ViolationKind {
    /// Whether lenient mode may repair this violation
    pub fn is_repairable(&self) -> bool {
        matches!(self, ViolationKind::Orientation | ViolationKind::SelfIntersection)
    }
}

/// Validation result with details
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

/// Validation error with location details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub kind: ViolationKind,
    pub location: String,
    pub reason: String,
}

impl ValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        Self { is_valid: true, errors: Vec::new() }
    }

    /// Add an error to the result
    pub fn add_error(&mut self, kind: ViolationKind, location: String, reason: String) {
        self.is_valid = false;
        self.errors.push(ValidationError { kind, location, reason });
    }

    /// Whether every violation can be repaired in lenient mode
    pub fn is_repairable(&self) -> bool {
        !self.is_valid && self.errors.iter().all(|e| e.kind.is_repairable())
    }

    pub fn has(&self, kind: ViolationKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    /// Convert the violations into a `ValidationError` listing each of them
    pub fn into_error(self) -> GeoqueryError {
        let details: Vec<String> =
            self.errors.iter().map(|e| format!("{}: {}", e.location, e.reason)).collect();
        GeoqueryError::field_validation("geometry", format!("Invalid geometry: {}", details.join("; ")))
    }
}

/// Per-geometry and remaining request-wide vertex allowance
#[derive(Debug, Clone, Copy)]
pub struct VertexLimit {
    pub per_geometry: usize,
    pub remaining: usize,
}

/// Validate a geometry
///
/// Checks run in a fixed order and stop at the first failing stage:
/// finiteness, CRS domain, vertex caps, structure (point counts and ring
/// closure), then polygon topology (ring orientation and self-intersection).
pub fn validate_geometry(geometry: &Geometry, limit: VertexLimit) -> ValidationResult {
    let mut result = ValidationResult::valid();

    let mut non_finite: Option<Coordinate> = None;
    geometry.shape.for_each_coordinate(&mut |c| {
        if non_finite.is_none() && !c.is_finite() {
            non_finite = Some(*c);
        }
    });
    if let Some(c) = non_finite {
        result.add_error(
            ViolationKind::NonFinite,
            format!("Coordinate({}, {})", c.x, c.y),
            "Coordinates must be finite".to_string(),
        );
        return result;
    }

    if let Some(c) = outside_domain(geometry) {
        result.add_error(
            ViolationKind::OutOfDomain,
            format!("Coordinate({}, {})", c.x, c.y),
            format!("Coordinate is outside the valid domain of {}", geometry.crs),
        );
        return result;
    }

    let count = geometry.vertex_count();
    if count > limit.per_geometry {
        result.add_error(
            ViolationKind::TooManyVertices,
            format!("{:?}", geometry.geometry_type()),
            format!("Geometry has {} vertices, maximum is {}", count, limit.per_geometry),
        );
        return result;
    }
    if count > limit.remaining {
        result.add_error(
            ViolationKind::TooManyVertices,
            format!("{:?}", geometry.geometry_type()),
            format!(
                "Geometry has {} vertices but only {} remain in the request's vertex budget",
                count, limit.remaining
            ),
        );
        return result;
    }

    check_structure(&geometry.shape, "", &mut result);
    if !result.is_valid {
        return result;
    }

    check_topology(&geometry.shape, "", &mut result);
    result
}

fn location(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn check_structure(shape: &Shape, prefix: &str, result: &mut ValidationResult) {
    match shape {
        Shape::Point(_) | Shape::MultiPoint(_) => {}
        Shape::LineString(coords) => check_linestring(coords, &location(prefix, "LineString"), result),
        Shape::MultiLineString(lines) => {
            for (i, line) in lines.iter().enumerate() {
                check_linestring(line, &location(prefix, &format!("MultiLineString[{}]", i)), result);
            }
        }
        Shape::Polygon(rings) => check_rings(rings, &location(prefix, "Polygon"), result),
        Shape::MultiPolygon(polygons) => {
            for (i, rings) in polygons.iter().enumerate() {
                check_rings(rings, &location(prefix, &format!("MultiPolygon[{}]", i)), result);
            }
        }
        Shape::GeometryCollection(shapes) => {
            for (i, shape) in shapes.iter().enumerate() {
                check_structure(shape, &location(prefix, &format!("GeometryCollection[{}]", i)), result);
            }
        }
        Shape::Envelope { min, max } => {
            if min.x > max.x || min.y > max.y {
                result.add_error(
                    ViolationKind::InvalidEnvelope,
                    location(prefix, "Envelope"),
                    "Lower corner must not exceed upper corner".to_string(),
                );
            }
        }
    }
}

fn check_linestring(coords: &[Coordinate], location: &str, result: &mut ValidationResult) {
    // LineString must have at least 2 points
    if coords.len() < 2 {
        result.add_error(
            ViolationKind::TooFewPoints,
            location.to_string(),
            format!("LineString must have at least 2 points, found {}", coords.len()),
        );
    }
}

fn check_rings(rings: &[Vec<Coordinate>], location: &str, result: &mut ValidationResult) {
    if rings.is_empty() {
        result.add_error(
            ViolationKind::TooFewPoints,
            location.to_string(),
            "Polygon must have an exterior ring".to_string(),
        );
        return;
    }

    for (i, ring) in rings.iter().enumerate() {
        let ring_name = if i == 0 {
            format!("{} exterior", location)
        } else {
            format!("{} interior[{}]", location, i - 1)
        };

        if ring.len() < 4 {
            result.add_error(
                ViolationKind::TooFewPoints,
                ring_name.clone(),
                format!("Ring must have at least 4 points, found {}", ring.len()),
            );
        }

        if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
            if !first.same_xy(last) {
                result.add_error(
                    ViolationKind::RingClosure,
                    ring_name,
                    "ring closure violated: first and last positions differ".to_string(),
                );
            }
        }
    }
}

fn check_topology(shape: &Shape, prefix: &str, result: &mut ValidationResult) {
    match shape {
        Shape::Polygon(rings) => check_polygon_topology(rings, &location(prefix, "Polygon"), result),
        Shape::MultiPolygon(polygons) => {
            for (i, rings) in polygons.iter().enumerate() {
                check_polygon_topology(rings, &location(prefix, &format!("MultiPolygon[{}]", i)), result);
            }
        }
        Shape::GeometryCollection(shapes) => {
            for (i, shape) in shapes.iter().enumerate() {
                check_topology(shape, &location(prefix, &format!("GeometryCollection[{}]", i)), result);
            }
        }
        _ => {}
    }
}

fn check_polygon_topology(rings: &[Vec<Coordinate>], location: &str, result: &mut ValidationResult) {
    for (i, ring) in rings.iter().enumerate() {
        let line = geo::LineString::new(ring.iter().map(|c| geo::Coord { x: c.x, y: c.y }).collect());
        let (expected_ccw, ring_name) = if i == 0 {
            (true, format!("{} exterior", location))
        } else {
            (false, format!("{} interior[{}]", location, i - 1))
        };
        let misoriented = if expected_ccw { line.is_cw() } else { line.is_ccw() };
        if misoriented {
            result.add_error(
                ViolationKind::Orientation,
                ring_name,
                if expected_ccw {
                    "Exterior ring must be wound counter-clockwise".to_string()
                } else {
                    "Interior ring must be wound clockwise".to_string()
                },
            );
        }
    }

    if let Some(point) = find_self_intersection(rings) {
        result.add_error(
            ViolationKind::SelfIntersection,
            location.to_string(),
            format!("Self-intersection at ({}, {})", point[0], point[1]),
        );
    }
}

#[derive(Debug, Clone, Copy)]
struct RingSegment {
    start: [f64; 2],
    end: [f64; 2],
    ring: usize,
    index: usize,
}

impl RingSegment {
    fn shares_endpoint(&self, other: &RingSegment) -> bool {
        self.ring == other.ring && (self.end == other.start || self.start == other.end)
    }

    fn has_vertex(&self, point: [f64; 2]) -> bool {
        self.start == point || self.end == point
    }
}

impl RTreeObject for RingSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.start, self.end)
    }
}

/// First crossing between ring segments, using an R-tree over the segments
/// so large rings are not compared pairwise
fn find_self_intersection(rings: &[Vec<Coordinate>]) -> Option<[f64; 2]> {
    let segments: Vec<RingSegment> = rings
        .iter()
        .enumerate()
        .flat_map(|(ring, coords)| {
            coords.windows(2).enumerate().filter(|(_, w)| !w[0].same_xy(&w[1])).map(
                move |(index, w)| RingSegment {
                    start: [w[0].x, w[0].y],
                    end: [w[1].x, w[1].y],
                    ring,
                    index,
                },
            )
        })
        .collect();

    let tree = RTree::bulk_load(segments.clone());

    for segment in &segments {
        for other in tree.locate_in_envelope_intersecting(&segment.envelope()) {
            // Visit each unordered pair once
            if (other.ring, other.index) <= (segment.ring, segment.index) {
                continue;
            }

            let a = geo::Line::new(segment.start, segment.end);
            let b = geo::Line::new(other.start, other.end);
            match line_intersection(a, b) {
                None => {}
                Some(LineIntersection::SinglePoint { intersection, is_proper }) => {
                    // Consecutive segments meet at their shared vertex; distinct
                    // rings may touch at a single point, as may a ring at one of
                    // its own vertices
                    let point = [intersection.x, intersection.y];
                    if !is_proper
                        && (segment.shares_endpoint(other)
                            || segment.ring != other.ring
                            || (segment.has_vertex(point) && other.has_vertex(point)))
                    {
                        continue;
                    }
                    return Some(point);
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    return Some([intersection.start.x, intersection.start.y]);
                }
            }
        }
    }

    None
}

/// Repair orientation and self-intersection violations
///
/// Self-intersecting polygons are rebuilt through a boolean union with
/// themselves (the equivalent of a zero-width buffer); all rings are then
/// re-oriented to counter-clockwise exteriors and clockwise holes.
pub fn repair_geometry(geometry: &Geometry, result: &ValidationResult) -> Geometry {
    let rebuild = result.has(ViolationKind::SelfIntersection);
    Geometry::new(repair_shape(&geometry.shape, rebuild), geometry.crs)
}

fn repair_shape(shape: &Shape, rebuild: bool) -> Shape {
    match shape {
        Shape::Polygon(_) | Shape::MultiPolygon(_) => {
            let polygons: Vec<geo::Polygon> = match to_geo_geometry(shape) {
                geo::Geometry::Polygon(p) => vec![p],
                geo::Geometry::MultiPolygon(mp) => mp.0,
                _ => Vec::new(),
            };

            let mut repaired: Vec<geo::Polygon> = Vec::new();
            for polygon in polygons {
                if rebuild {
                    repaired.extend(polygon.union(&polygon));
                } else {
                    repaired.push(polygon);
                }
            }

            let oriented: Vec<geo::Polygon> =
                repaired.iter().map(|p| p.orient(Direction::Default)).collect();
            match oriented.len() {
                1 => from_geo_geometry(&geo::Geometry::Polygon(oriented[0].clone())),
                _ => from_geo_geometry(&geo::Geometry::MultiPolygon(geo::MultiPolygon::new(oriented))),
            }
        }
        Shape::GeometryCollection(shapes) => {
            Shape::GeometryCollection(shapes.iter().map(|s| repair_shape(s, rebuild)).collect())
        }
        other => other.clone(),
    }
}

/// Validate and, when allowed, repair a geometry
///
/// Returns the geometry to use and whether it was repaired.
pub fn validate_and_repair(
    geometry: Geometry,
    limit: VertexLimit,
    mode: crate::models::ValidityMode,
) -> Result<(Geometry, bool)> {
    let result = validate_geometry(&geometry, limit);
    if result.is_valid {
        return Ok((geometry, false));
    }

    if mode == crate::models::ValidityMode::Strict || !result.is_repairable() {
        return Err(result.into_error());
    }

    let repaired = repair_geometry(&geometry, &result);
    let recheck = validate_geometry(&repaired, limit);
    if !recheck.is_valid {
        let mut err = recheck;
        err.errors.iter_mut().for_each(|e| e.reason = format!("{} (after repair)", e.reason));
        return Err(err.into_error());
    }

    tracing::debug!(
        violations = result.errors.len(),
        "Repaired geometry in lenient mode"
    );
    Ok((repaired, true))
}
