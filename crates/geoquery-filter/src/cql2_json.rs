//! CQL2-JSON parser
//!
//! Walks the `{"op": ..., "args": [...]}` tree. Error locators are JSONPath
//! expressions such as `$.args[1].args[0]`.

use crate::resolve::{
    between, check_depth, check_nesting, check_relate_pattern, combine, comparison, in_list,
    parse_date, parse_timestamp, spatial_operator, transpose_relate_pattern,
};
use crate::{FilterContext, FilterDialect, FilterParser};
use geoquery_core::error::{GeoqueryError, Result};
use geoquery_core::models::{
    ComparisonOperator, Distance, DistanceUnit, FieldDefinition, FilterExpression, Geometry,
    Literal, LogicalOperator, SpatialFilter, SpatialPredicate,
};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Copy, Default)]
pub struct Cql2JsonParser;

impl Cql2JsonParser {
    /// Parse an already decoded CQL2-JSON document
    pub fn parse_value(&self, value: &JsonValue, ctx: &FilterContext<'_>) -> Result<FilterExpression> {
        let expression = Walker { ctx }.expression(value, "$", 1)?;
        check_depth(&expression, &ctx.limits)?;
        Ok(expression)
    }
}

impl FilterParser for Cql2JsonParser {
    fn dialect(&self) -> FilterDialect {
        FilterDialect::Cql2Json
    }

    fn parse(&self, input: &str, ctx: &FilterContext<'_>) -> Result<FilterExpression> {
        let value: JsonValue = serde_json::from_str(input).map_err(|e| {
            GeoqueryError::parse(
                format!("Invalid JSON: {}", e),
                format!("line {} column {}", e.line(), e.column()),
            )
        })?;
        self.parse_value(&value, ctx)
    }
}

struct Walker<'c> {
    ctx: &'c FilterContext<'c>,
}

fn arg_path(path: &str, index: usize) -> String {
    format!("{}.args[{}]", path, index)
}

fn property(value: &JsonValue) -> Option<&str> {
    value.get("property").and_then(JsonValue::as_str)
}

/// Unwrap `{"op": "casei", "args": [x]}`, reporting whether it was present
fn casei(value: &JsonValue) -> (&JsonValue, bool) {
    let is_casei = value
        .get("op")
        .and_then(JsonValue::as_str)
        .is_some_and(|op| op.eq_ignore_ascii_case("casei"));
    match value.get("args").and_then(JsonValue::as_array) {
        Some(args) if is_casei && args.len() == 1 => (&args[0], true),
        _ => (value, false),
    }
}

impl<'c> Walker<'c> {
    fn expression(&self, node: &JsonValue, path: &str, depth: usize) -> Result<FilterExpression> {
        check_nesting(depth, &self.ctx.limits, path)?;

        let op = node
            .get("op")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| GeoqueryError::parse("Expected an object with an \"op\" member", path))?;
        let args: &[JsonValue] = match node.get("args") {
            Some(JsonValue::Array(args)) => args,
            Some(_) => return Err(GeoqueryError::parse("\"args\" must be an array", path)),
            None => &[],
        };

        match op.to_ascii_lowercase().as_str() {
            "and" | "or" => {
                if args.is_empty() {
                    return Err(GeoqueryError::parse(format!("'{}' needs operands", op), path));
                }
                let operator =
                    if op.eq_ignore_ascii_case("and") { LogicalOperator::And } else { LogicalOperator::Or };
                let operands = args
                    .iter()
                    .enumerate()
                    .map(|(i, arg)| self.expression(arg, &arg_path(path, i), depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                Ok(combine(operator, operands))
            }
            "not" => {
                let [operand] = args else {
                    return Err(GeoqueryError::parse("'not' takes exactly one operand", path));
                };
                Ok(FilterExpression::not(self.expression(operand, &arg_path(path, 0), depth + 1)?))
            }
            "=" | "eq" => self.comparison(ComparisonOperator::Equal, args, path),
            "<>" | "neq" => self.comparison(ComparisonOperator::NotEqual, args, path),
            "<" | "lt" => self.comparison(ComparisonOperator::LessThan, args, path),
            "<=" | "lte" => self.comparison(ComparisonOperator::LessThanOrEqual, args, path),
            ">" | "gt" => self.comparison(ComparisonOperator::GreaterThan, args, path),
            ">=" | "gte" => self.comparison(ComparisonOperator::GreaterThanOrEqual, args, path),
            "like" => self.comparison(ComparisonOperator::Like, args, path),
            "ilike" => self.comparison(ComparisonOperator::ILike, args, path),
            "between" => self.between(args, path),
            "in" => self.in_list(args, path),
            "isnull" => {
                let [operand] = args else {
                    return Err(GeoqueryError::parse("'isNull' takes exactly one operand", path));
                };
                let field = self.field(operand, &arg_path(path, 0), true)?;
                Ok(FilterExpression::IsNull { field: field.name.clone(), negated: false })
            }
            other => match spatial_operator(other) {
                Some((predicate, negated)) => {
                    let expression = self.spatial(predicate, args, path)?;
                    Ok(if negated { FilterExpression::not(expression) } else { expression })
                }
                None => Err(GeoqueryError::parse(format!("Unsupported operator '{}'", op), path)),
            },
        }
    }

    fn field(&self, value: &JsonValue, path: &str, allow_geometry: bool) -> Result<&'c FieldDefinition> {
        let name = property(value)
            .ok_or_else(|| GeoqueryError::parse("Expected {\"property\": ...}", path))?;
        if allow_geometry {
            self.ctx.fields.resolve(name, path)
        } else {
            self.ctx.fields.property(name, path)
        }
    }

    fn literal(&self, value: &JsonValue, path: &str) -> Result<Literal> {
        let literal = match value {
            JsonValue::String(s) => Literal::String(s.clone()),
            JsonValue::Bool(b) => Literal::Boolean(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Literal::Integer(i),
                None => Literal::Double(n.as_f64().ok_or_else(|| {
                    GeoqueryError::parse(format!("Unrepresentable number {}", n), path)
                })?),
            },
            JsonValue::Object(object) => {
                if let Some(raw) = object.get("timestamp").and_then(JsonValue::as_str) {
                    Literal::DateTime(parse_timestamp(raw, path)?)
                } else if let Some(raw) = object.get("date").and_then(JsonValue::as_str) {
                    Literal::DateTime(parse_date(raw, path)?)
                } else {
                    return Err(GeoqueryError::parse("Expected a literal value", path));
                }
            }
            _ => return Err(GeoqueryError::parse("Expected a literal value", path)),
        };
        Ok(literal)
    }

    fn comparison(
        &self,
        operator: ComparisonOperator,
        args: &[JsonValue],
        path: &str,
    ) -> Result<FilterExpression> {
        let [left, right] = args else {
            return Err(GeoqueryError::parse("Comparison takes exactly two operands", path));
        };
        let (left, left_casei) = casei(left);
        let (right, right_casei) = casei(right);
        let operator = match operator {
            ComparisonOperator::Like if left_casei || right_casei => ComparisonOperator::ILike,
            other => other,
        };

        if property(left).is_some() {
            let field = self.field(left, &arg_path(path, 0), false)?;
            comparison(field, operator, self.literal(right, &arg_path(path, 1))?)
        } else if property(right).is_some() && !operator.is_pattern() {
            let field = self.field(right, &arg_path(path, 1), false)?;
            comparison(field, operator.flipped(), self.literal(left, &arg_path(path, 0))?)
        } else {
            Err(GeoqueryError::parse("Comparison needs a property operand", path))
        }
    }

    fn between(&self, args: &[JsonValue], path: &str) -> Result<FilterExpression> {
        let (subject, lower, upper) = match args {
            [subject, lower, upper] => (subject, lower, upper),
            [subject, JsonValue::Array(bounds)] if bounds.len() == 2 => (subject, &bounds[0], &bounds[1]),
            _ => return Err(GeoqueryError::parse("'between' takes a property and two bounds", path)),
        };
        let field = self.field(subject, &arg_path(path, 0), false)?;
        between(
            field,
            self.literal(lower, &arg_path(path, 1))?,
            self.literal(upper, &arg_path(path, 2))?,
        )
    }

    fn in_list(&self, args: &[JsonValue], path: &str) -> Result<FilterExpression> {
        let [subject, JsonValue::Array(items)] = args else {
            return Err(GeoqueryError::parse("'in' takes a property and an array of values", path));
        };
        let field = self.field(subject, &arg_path(path, 0), false)?;
        let list_path = arg_path(path, 1);
        let values = items
            .iter()
            .enumerate()
            .map(|(i, item)| self.literal(item, &format!("{}[{}]", list_path, i)))
            .collect::<Result<Vec<_>>>()?;
        in_list(field, values, &self.ctx.limits, list_path)
    }

    fn geometry(&self, value: &JsonValue, path: &str) -> Result<Geometry> {
        let parsed = match value {
            // Legacy CQL-JSON bbox operand: [minx, miny, maxx, maxy]
            JsonValue::Array(_) => {
                self.ctx.geometry.parse_geojson_value(&serde_json::json!({ "bbox": value }))
            }
            _ => self.ctx.geometry.parse_geojson_value(value),
        };
        parsed.map(|p| p.geometry).map_err(|e| match e {
            GeoqueryError::Parse { message, .. } => GeoqueryError::parse(message, path),
            other => other,
        })
    }

    fn spatial(
        &self,
        predicate: SpatialPredicate,
        args: &[JsonValue],
        path: &str,
    ) -> Result<FilterExpression> {
        if args.len() < 2 {
            return Err(GeoqueryError::parse(
                format!("'{}' needs a property and a geometry", predicate.name()),
                path,
            ));
        }

        // Literal-first operands are normalized by swapping to the converse
        let swapped = property(&args[0]).is_none();
        let (field_arg, geometry_arg, predicate) = if !swapped {
            ((&args[0], 0), (&args[1], 1), predicate)
        } else if property(&args[1]).is_some() {
            let converse = match predicate {
                SpatialPredicate::Contains => SpatialPredicate::Within,
                SpatialPredicate::Within => SpatialPredicate::Contains,
                other => other,
            };
            ((&args[1], 1), (&args[0], 0), converse)
        } else {
            return Err(GeoqueryError::parse("Spatial operator needs a property operand", path));
        };

        let field_path = arg_path(path, field_arg.1);
        let name = property(field_arg.0).unwrap_or_default();
        let field = self.ctx.fields.geometry(Some(name), field_path)?;
        let geometry = self.geometry(geometry_arg.0, &arg_path(path, geometry_arg.1))?;

        let filter = match predicate {
            SpatialPredicate::DWithin => {
                let distance = self.distance(&args[2..], path)?;
                SpatialFilter::dwithin(field.name.clone(), geometry, distance)
            }
            SpatialPredicate::Relate => {
                let pattern_path = arg_path(path, 2);
                let pattern = args
                    .get(2)
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| GeoqueryError::parse("Expected DE-9IM pattern string", &pattern_path))?;
                let pattern = check_relate_pattern(pattern, pattern_path)?;
                let pattern = if swapped { transpose_relate_pattern(&pattern) } else { pattern };
                SpatialFilter::relate(field.name.clone(), geometry, pattern)
            }
            other => {
                if args.len() != 2 {
                    return Err(GeoqueryError::parse(
                        format!("'{}' takes exactly two operands", other.name()),
                        path,
                    ));
                }
                SpatialFilter::new(other, field.name.clone(), geometry)
            }
        };
        Ok(FilterExpression::Spatial(filter))
    }

    /// `distance[, unit]` or `{"value": distance, "unit": unit}`
    fn distance(&self, rest: &[JsonValue], path: &str) -> Result<Distance> {
        let distance_path = arg_path(path, 2);
        let (value, unit) = match rest {
            [JsonValue::Object(object)] => (
                object.get("value").and_then(JsonValue::as_f64),
                object.get("unit").and_then(JsonValue::as_str),
            ),
            [value] => (value.as_f64(), None),
            [value, unit] => (value.as_f64(), unit.as_str()),
            _ => (None, None),
        };

        let value = value
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| GeoqueryError::parse("Expected a non-negative distance", &distance_path))?;
        let unit = match unit {
            Some(token) => DistanceUnit::from_token(token).ok_or_else(|| {
                GeoqueryError::parse(format!("Unknown distance unit '{}'", token), arg_path(path, 3))
            })?,
            None => DistanceUnit::Meters,
        };
        Ok(Distance::new(value, unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoquery_core::error::ErrorKind;
    use geoquery_core::models::{Crs, FieldCatalog, FieldType, ParserLimits};
    use geoquery_geo::GeometryParser;
    use serde_json::json;

    fn catalog() -> FieldCatalog {
        FieldCatalog::new(vec![
            FieldDefinition::new("age", FieldType::Integer),
            FieldDefinition::new("status", FieldType::String),
            FieldDefinition::new("email", FieldType::String),
            FieldDefinition::geometry("geom", Crs::wgs84()),
        ])
    }

    fn parse(value: JsonValue) -> Result<FilterExpression> {
        let catalog = catalog();
        let geometry = GeometryParser::default();
        let ctx = FilterContext::new(&catalog, &geometry, ParserLimits::default());
        Cql2JsonParser.parse_value(&value, &ctx)
    }

    #[test]
    fn test_between_stays_one_node() {
        assert_eq!(
            parse(json!({"op": "between", "args": [{"property": "age"}, 18, 65]})).unwrap(),
            FilterExpression::Between {
                field: "age".into(),
                lower: Literal::Integer(18),
                upper: Literal::Integer(65),
            }
        );
    }

    #[test]
    fn test_in_normalization() {
        assert!(matches!(
            parse(json!({"op": "in", "args": [{"property": "status"}, ["a", "b"]]})).unwrap(),
            FilterExpression::In { ref values, .. } if values.len() == 2
        ));
        assert_eq!(
            parse(json!({"op": "in", "args": [{"property": "status"}, ["a"]]})).unwrap(),
            FilterExpression::comparison("status", ComparisonOperator::Equal, Literal::String("a".into()))
        );
    }

    #[test]
    fn test_is_null() {
        assert_eq!(
            parse(json!({"op": "isNull", "args": [{"property": "email"}]})).unwrap(),
            FilterExpression::IsNull { field: "email".into(), negated: false }
        );
    }

    #[test]
    fn test_reversed_operands_flip() {
        assert_eq!(
            parse(json!({"op": "<", "args": [18, {"property": "age"}]})).unwrap(),
            FilterExpression::comparison("age", ComparisonOperator::GreaterThan, Literal::Integer(18))
        );
    }

    #[test]
    fn test_casei_like() {
        let expr = parse(json!({"op": "like", "args": [
            {"op": "casei", "args": [{"property": "status"}]},
            {"op": "casei", "args": ["op%"]}
        ]}))
        .unwrap();
        assert_eq!(
            expr,
            FilterExpression::comparison("status", ComparisonOperator::ILike, Literal::String("op%".into()))
        );
    }

    #[test]
    fn test_spatial_intersects_and_converse() {
        let polygon = json!({"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]});
        let FilterExpression::Spatial(filter) =
            parse(json!({"op": "s_intersects", "args": [{"property": "geom"}, polygon.clone()]})).unwrap()
        else {
            panic!("expected spatial");
        };
        assert_eq!(filter.predicate, SpatialPredicate::Intersects);

        let FilterExpression::Spatial(filter) =
            parse(json!({"op": "s_within", "args": [polygon, {"property": "geom"}]})).unwrap()
        else {
            panic!("expected spatial");
        };
        assert_eq!(filter.predicate, SpatialPredicate::Contains);
    }

    #[test]
    fn test_literal_first_relate_transposes_pattern() {
        let point = json!({"type": "Point", "coordinates": [1, 2]});
        let pattern_of = |args: JsonValue| match parse(json!({"op": "s_relate", "args": args})).unwrap() {
            FilterExpression::Spatial(filter) => filter.pattern,
            other => panic!("expected spatial, got {:?}", other),
        };

        assert_eq!(pattern_of(json!([{"property": "geom"}, point.clone(), "T*F**F***"])), Some("T*F**F***".into()));
        assert_eq!(pattern_of(json!([point, {"property": "geom"}, "T*F**F***"])), Some("T*****FF*".into()));
    }

    #[test]
    fn test_dwithin_units() {
        let FilterExpression::Spatial(filter) = parse(json!({"op": "s_dwithin", "args": [
            {"property": "geom"}, {"type": "Point", "coordinates": [1, 2]}, 2, "kilometers"
        ]}))
        .unwrap() else {
            panic!("expected spatial");
        };
        assert_eq!(filter.distance, Some(Distance::meters(2000.0)));
    }

    #[test]
    fn test_errors_carry_json_path() {
        let err = parse(json!({"op": "and", "args": [
            {"op": "=", "args": [{"property": "age"}, 1]},
            {"op": "=", "args": [{"property": "height"}, 1]}
        ]}))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("$.args[1].args[0]"), "{}", err);

        let err = parse(json!({"op": "t_before", "args": []})).unwrap_err();
        assert!(err.to_string().contains("Unsupported operator"), "{}", err);
    }

    #[test]
    fn test_in_cap() {
        let values: Vec<i32> = (0..1001).collect();
        let err = parse(json!({"op": "in", "args": [{"property": "age"}, values]})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }
}
