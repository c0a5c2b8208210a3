//! Filter tree to parameterized SQL
//!
//! Every literal, geometry and pattern is bound through the [`SqlWriter`];
//! the emitted text holds only quoted identifiers, placeholders and keywords.

use super::backend::{SpatialMode, SpatialTarget, SqlBackend, SqlWriter};
use geoquery_core::error::{GeoqueryError, Result, UnsupportedReason};
use geoquery_core::models::{
    BoundingBox, ComparisonOperator, Crs, FieldDefinition, FilterExpression, LayerPolicy, Literal,
    LogicalOperator, SpatialFilter, SpatialPredicate, SqlFragment, SqlValue,
};
use geoquery_geo::GeometryExt;

/// Meters per degree of latitude
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Translates filter trees against one layer
pub struct FilterTranslator<'a> {
    backend: &'a dyn SqlBackend,
    layer: &'a LayerPolicy,
    mode: SpatialMode,
}

impl<'a> FilterTranslator<'a> {
    pub fn new(backend: &'a dyn SqlBackend, layer: &'a LayerPolicy, mode: SpatialMode) -> Self {
        Self { backend, layer, mode }
    }

    /// Render `filter` as a boolean SQL expression, binding into `writer`
    pub fn render(&self, writer: &mut SqlWriter<'_>, filter: &FilterExpression) -> Result<String> {
        self.node(writer, filter, false)
    }

    fn node(&self, w: &mut SqlWriter<'_>, expr: &FilterExpression, negated: bool) -> Result<String> {
        match expr {
            FilterExpression::Comparison { field, operator, value } => {
                let column = w.ident(&self.field(field)?.name);
                self.comparison(w, &column, *operator, value)
            }
            FilterExpression::Between { field, lower, upper } => {
                let column = w.ident(&self.field(field)?.name);
                let lower = w.bind(SqlValue::from(lower));
                let upper = w.bind(SqlValue::from(upper));
                if self.backend.supports_native_between() {
                    Ok(format!("{} BETWEEN {} AND {}", column, lower, upper))
                } else {
                    Ok(format!("({col} >= {} AND {col} <= {})", lower, upper, col = column))
                }
            }
            FilterExpression::In { field, values } => {
                let column = w.ident(&self.field(field)?.name);
                let mut distinct: Vec<&Literal> = Vec::with_capacity(values.len());
                for value in values {
                    if !distinct.iter().any(|seen| seen.same_value(value)) {
                        distinct.push(value);
                    }
                }
                match distinct.as_slice() {
                    [] => Ok("1 = 0".to_string()),
                    [single] => {
                        let ph = w.bind(SqlValue::from(*single));
                        Ok(format!("{} = {}", column, ph))
                    }
                    many => {
                        let placeholders: Vec<String> =
                            many.iter().map(|v| w.bind(SqlValue::from(*v))).collect();
                        Ok(format!("{} IN ({})", column, placeholders.join(", ")))
                    }
                }
            }
            FilterExpression::IsNull { field, negated: not_null } => {
                let column = w.ident(&self.field(field)?.name);
                Ok(if *not_null {
                    format!("{} IS NOT NULL", column)
                } else {
                    format!("{} IS NULL", column)
                })
            }
            FilterExpression::Logical { operator, operands } => match operator {
                LogicalOperator::Not => {
                    let [operand] = operands.as_slice() else {
                        return Err(GeoqueryError::validation("NOT takes exactly one operand"));
                    };
                    Ok(format!("NOT ({})", self.node(w, operand, !negated)?))
                }
                LogicalOperator::And | LogicalOperator::Or => {
                    let joiner = if *operator == LogicalOperator::And { " AND " } else { " OR " };
                    let parts = operands
                        .iter()
                        .map(|operand| self.node(w, operand, negated))
                        .collect::<Result<Vec<_>>>()?;
                    match parts.len() {
                        0 => Err(GeoqueryError::validation("empty logical expression")),
                        1 => Ok(parts.into_iter().collect()),
                        _ => Ok(format!("({})", parts.join(joiner))),
                    }
                }
            },
            FilterExpression::Spatial(spatial) => self.spatial(w, spatial, negated),
        }
    }

    fn field(&self, name: &str) -> Result<&'a FieldDefinition> {
        self.layer
            .catalog
            .resolve(name)
            .ok_or_else(|| GeoqueryError::field_validation(name, format!("Unknown field '{}'", name)))
    }

    fn comparison(
        &self,
        w: &mut SqlWriter<'_>,
        column: &str,
        operator: ComparisonOperator,
        value: &Literal,
    ) -> Result<String> {
        if operator.is_pattern() {
            let Literal::String(pattern) = value else {
                return Err(GeoqueryError::validation(format!(
                    "{} needs a string pattern, got {}",
                    operator.symbol(),
                    value.type_name()
                )));
            };
            let ph = w.bind(SqlValue::Text(self.backend.like_pattern(pattern)));
            return Ok(match operator {
                ComparisonOperator::ILike => self.backend.case_insensitive_like(column, &ph),
                _ => self.backend.like(column, &ph),
            });
        }
        let ph = w.bind(SqlValue::from(value));
        Ok(format!("{} {} {}", column, operator.symbol(), ph))
    }

    fn spatial(&self, w: &mut SqlWriter<'_>, spatial: &SpatialFilter, negated: bool) -> Result<String> {
        let field = self.field(&spatial.field)?;
        if !field.is_geometry() {
            return Err(GeoqueryError::field_validation(
                &field.name,
                format!("'{}' is not a geometry field", field.name),
            ));
        }
        let srid = field.srid.unwrap_or(self.layer.storage_crs);
        let target = SpatialTarget { table: &self.layer.table, column: &field.name };
        let column = w.ident(&field.name);

        match self.mode {
            SpatialMode::Native => self.native(w, spatial, target, &column, srid),
            SpatialMode::EnvelopeOnly => self.envelope_only(w, spatial, target, &column, srid, negated),
        }
    }

    fn unsupported(&self, predicate: SpatialPredicate, reason: UnsupportedReason) -> GeoqueryError {
        GeoqueryError::unsupported(predicate.name(), self.backend.label(), reason)
    }

    /// Geometry constructor for the literal, reprojected to the column CRS
    fn geometry(&self, w: &mut SqlWriter<'_>, spatial: &SpatialFilter, srid: Crs) -> Result<String> {
        let literal_crs = spatial.geometry.crs;
        if literal_crs != srid && !self.backend.supports_transform() {
            return Err(self.unsupported(spatial.predicate, UnsupportedReason::TransformUnavailable));
        }
        let wkt = w.bind(SqlValue::Text(spatial.geometry.to_wkt()));
        let geometry = self.backend.geometry_from_text(&wkt, literal_crs.epsg);
        Ok(if literal_crs == srid {
            geometry
        } else {
            self.backend.transform(&geometry, srid.epsg)
        })
    }

    fn native(
        &self,
        w: &mut SqlWriter<'_>,
        spatial: &SpatialFilter,
        target: SpatialTarget<'_>,
        column: &str,
        srid: Crs,
    ) -> Result<String> {
        let predicate = spatial.predicate;
        if !self.backend.supports_native_spatial() {
            return Err(self.unsupported(predicate, UnsupportedReason::NativeSpatialUnavailable));
        }
        if predicate == SpatialPredicate::Relate && !self.backend.supports_de9im() {
            return Err(self.unsupported(predicate, UnsupportedReason::De9imUnavailable));
        }

        let prefilter = if self.backend.supports_envelope_index()
            && predicate.implies_envelope_overlap()
            && predicate != SpatialPredicate::BBox
        {
            let geometry = self.geometry(w, spatial, srid)?;
            self.backend.envelope_prefilter(w, target, column, &geometry)
        } else {
            None
        };

        let geometry = self.geometry(w, spatial, srid)?;
        let exact = match predicate {
            SpatialPredicate::DWithin => {
                let meters = spatial
                    .distance
                    .map(|d| d.to_meters())
                    .ok_or_else(|| GeoqueryError::validation("DWITHIN without a distance"))?;
                let distance = w.bind(SqlValue::Double(meters));
                self.backend.distance_within(column, &geometry, &distance, srid.is_geographic(), srid.epsg)
            }
            SpatialPredicate::Relate => {
                let pattern = spatial
                    .pattern
                    .as_deref()
                    .ok_or_else(|| GeoqueryError::validation("RELATE without an intersection pattern"))?;
                let pattern = w.bind(SqlValue::Text(pattern.to_string()));
                self.backend.relate(column, &geometry, &pattern)?
            }
            SpatialPredicate::BBox => self.backend.predicate(SpatialPredicate::Intersects, column, &geometry),
            other => self.backend.predicate(other, column, &geometry),
        };

        Ok(match prefilter {
            Some(prefilter) => format!("({} AND {})", prefilter, exact),
            None => exact,
        })
    }

    fn envelope_only(
        &self,
        w: &mut SqlWriter<'_>,
        spatial: &SpatialFilter,
        target: SpatialTarget<'_>,
        column: &str,
        srid: Crs,
        negated: bool,
    ) -> Result<String> {
        let predicate = spatial.predicate;
        // The envelope test is a superset of the match; its complement is not
        if negated || matches!(predicate, SpatialPredicate::Disjoint | SpatialPredicate::Relate) {
            return Err(self.unsupported(predicate, UnsupportedReason::EnvelopeApproximationImpossible));
        }
        if spatial.geometry.crs != srid {
            return Err(self.unsupported(predicate, UnsupportedReason::TransformUnavailable));
        }
        let mut bbox = spatial
            .geometry
            .bounding_box()
            .ok_or_else(|| GeoqueryError::validation("empty geometry has no envelope"))?;

        if predicate == SpatialPredicate::DWithin {
            let meters = spatial.distance.map(|d| d.to_meters()).unwrap_or(0.0);
            bbox = expand(&bbox, meters, srid.is_geographic());
        }

        self.backend.envelope_filter(w, target, column, &bbox, srid.epsg)
    }
}

/// Grow an envelope by a distance in meters
///
/// Geographic envelopes widen longitude by the cosine of the latitude
/// furthest from the equator.
fn expand(bbox: &BoundingBox, meters: f64, geographic: bool) -> BoundingBox {
    let (dx, dy) = if geographic {
        let dy = meters / METERS_PER_DEGREE;
        let lat = bbox.min_y.abs().max(bbox.max_y.abs()).min(90.0);
        let cos = lat.to_radians().cos().max(0.01);
        (dy / cos, dy)
    } else {
        (meters, meters)
    };
    BoundingBox {
        min_x: bbox.min_x - dx,
        min_y: bbox.min_y - dy,
        max_x: bbox.max_x + dx,
        max_y: bbox.max_y + dy,
        ..*bbox
    }
}

/// Translate a filter into a standalone SQL fragment
pub fn translate_filter(
    backend: &dyn SqlBackend,
    layer: &LayerPolicy,
    filter: &FilterExpression,
    mode: SpatialMode,
) -> Result<SqlFragment> {
    let mut writer = SqlWriter::new(backend);
    let sql = FilterTranslator::new(backend, layer, mode).render(&mut writer, filter)?;
    writer.push(&sql);
    tracing::debug!(backend = backend.label(), params = writer.param_count(), "Translated filter");
    Ok(writer.finish())
}
