//! OGC Filter Encoding (FES 2.0 and 1.1) parser
//!
//! Documents go through the hardened [`XmlElement`] reader, so DTDs and
//! external entities are rejected before any filter semantics are applied.

use crate::resolve::{
    between, check_depth, check_nesting, check_relate_pattern, combine, comparison, in_list,
    spatial_operator,
};
use crate::{FilterContext, FilterDialect, FilterParser};
use geoquery_core::error::{GeoqueryError, Result};
use geoquery_core::models::{
    ComparisonOperator, Distance, DistanceUnit, FieldDefinition, FieldType, FilterExpression,
    Geometry, Literal, LogicalOperator, SpatialFilter, SpatialPredicate,
};
use geoquery_geo::gml::is_geometry_element;
use geoquery_geo::{XmlElement, MAX_XML_DEPTH};

#[derive(Debug, Clone, Copy, Default)]
pub struct FesParser;

impl FesParser {
    /// Parse an already read `Filter` element
    pub fn parse_element(&self, root: &XmlElement, ctx: &FilterContext<'_>) -> Result<FilterExpression> {
        if root.name != "Filter" {
            return Err(GeoqueryError::parse(
                format!("Expected <Filter> root element, found <{}>", root.name),
                locator(root),
            ));
        }

        let walker = Walker { ctx };
        let expression = match root.children.as_slice() {
            [] => return Err(GeoqueryError::parse("Filter is empty", locator(root))),
            [single] if !is_identifier(single) => walker.expression(single, 1)?,
            children if children.iter().all(is_identifier) => walker.identifiers(children)?,
            _ => {
                return Err(GeoqueryError::parse(
                    "Filter must contain one predicate or only identifiers",
                    locator(root),
                ))
            }
        };
        check_depth(&expression, &ctx.limits)?;
        Ok(expression)
    }
}

impl FilterParser for FesParser {
    fn dialect(&self) -> FilterDialect {
        FilterDialect::Fes
    }

    fn parse(&self, input: &str, ctx: &FilterContext<'_>) -> Result<FilterExpression> {
        let root = XmlElement::parse(input, MAX_XML_DEPTH)?;
        self.parse_element(&root, ctx)
    }
}

fn locator(element: &XmlElement) -> String {
    format!("fes:{}", element.name)
}

fn is_identifier(element: &XmlElement) -> bool {
    matches!(element.name.as_str(), "ResourceId" | "FeatureId" | "GmlObjectId")
}

fn is_property(element: &XmlElement) -> bool {
    matches!(element.name.as_str(), "ValueReference" | "PropertyName")
}

/// Escape `%`, `_` and `\` so a value matches itself under `LIKE ... ESCAPE '\'`
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Rewrite a FES pattern with custom wildcard characters to SQL `%`/`_`
/// with `\` as the escape character
fn like_pattern(pattern: &str, wild_card: &str, single_char: &str, escape_char: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(c) = rest.chars().next() {
        if !escape_char.is_empty() && rest.starts_with(escape_char) {
            rest = &rest[escape_char.len()..];
            if let Some(escaped) = rest.chars().next() {
                out.push_str(&escape_like(&escaped.to_string()));
                rest = &rest[escaped.len_utf8()..];
            }
        } else if !wild_card.is_empty() && rest.starts_with(wild_card) {
            out.push('%');
            rest = &rest[wild_card.len()..];
        } else if !single_char.is_empty() && rest.starts_with(single_char) {
            out.push('_');
            rest = &rest[single_char.len()..];
        } else {
            out.push_str(&escape_like(&c.to_string()));
            rest = &rest[c.len_utf8()..];
        }
    }
    out
}

struct Walker<'c> {
    ctx: &'c FilterContext<'c>,
}

impl<'c> Walker<'c> {
    fn expression(&self, element: &XmlElement, depth: usize) -> Result<FilterExpression> {
        check_nesting(depth, &self.ctx.limits, locator(element))?;

        let operator = match element.name.as_str() {
            "PropertyIsEqualTo" => Some(ComparisonOperator::Equal),
            "PropertyIsNotEqualTo" => Some(ComparisonOperator::NotEqual),
            "PropertyIsLessThan" => Some(ComparisonOperator::LessThan),
            "PropertyIsLessThanOrEqualTo" => Some(ComparisonOperator::LessThanOrEqual),
            "PropertyIsGreaterThan" => Some(ComparisonOperator::GreaterThan),
            "PropertyIsGreaterThanOrEqualTo" => Some(ComparisonOperator::GreaterThanOrEqual),
            _ => None,
        };
        if let Some(operator) = operator {
            return self.comparison(element, operator);
        }

        match element.name.as_str() {
            "And" | "Or" => {
                if element.children.is_empty() {
                    return Err(GeoqueryError::parse("Logical operator needs operands", locator(element)));
                }
                let operator =
                    if element.name == "And" { LogicalOperator::And } else { LogicalOperator::Or };
                let operands = element
                    .children
                    .iter()
                    .map(|child| self.expression(child, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                Ok(combine(operator, operands))
            }
            "Not" => {
                let [operand] = element.children.as_slice() else {
                    return Err(GeoqueryError::parse("<Not> takes exactly one operand", locator(element)));
                };
                Ok(FilterExpression::not(self.expression(operand, depth + 1)?))
            }
            "PropertyIsLike" => self.like(element),
            "PropertyIsNull" | "PropertyIsNil" => {
                let field = self.ctx.fields.resolve(self.reference(element)?, locator(element))?;
                Ok(FilterExpression::IsNull { field: field.name.clone(), negated: false })
            }
            "PropertyIsBetween" => self.between(element),
            "ResourceId" | "FeatureId" | "GmlObjectId" => self.identifiers(std::slice::from_ref(element)),
            name => match spatial_operator(name) {
                Some((predicate, negated)) => {
                    let expression = self.spatial(element, predicate)?;
                    Ok(if negated { FilterExpression::not(expression) } else { expression })
                }
                None => Err(GeoqueryError::parse(
                    format!("Unsupported filter element <{}>", name),
                    locator(element),
                )),
            },
        }
    }

    fn property_name<'e>(&self, element: &'e XmlElement) -> Option<&'e str> {
        element.children.iter().find(|c| is_property(c)).map(|c| c.text())
    }

    fn reference<'e>(&self, element: &'e XmlElement) -> Result<&'e str> {
        self.property_name(element).map(strip_prefix).ok_or_else(|| {
            GeoqueryError::parse("Expected <ValueReference> or <PropertyName>", locator(element))
        })
    }

    /// Resolve the `ValueReference`/`PropertyName` child to a non-geometry field
    fn field(&self, element: &XmlElement) -> Result<&'c FieldDefinition> {
        self.ctx.fields.property(self.reference(element)?, locator(element))
    }

    fn literal<'e>(&self, element: &'e XmlElement, name: &str) -> Result<&'e str> {
        element
            .child(name)
            .map(XmlElement::text)
            .ok_or_else(|| GeoqueryError::parse(format!("Expected <{}>", name), locator(element)))
    }

    fn comparison(&self, element: &XmlElement, operator: ComparisonOperator) -> Result<FilterExpression> {
        let field = self.field(element)?;
        let value = self.literal(element, "Literal")?;

        // Operands may be written literal-first
        let reversed = element
            .children
            .iter()
            .position(|c| c.name == "Literal")
            .zip(element.children.iter().position(is_property))
            .is_some_and(|(literal, property)| literal < property);
        let operator = if reversed { operator.flipped() } else { operator };

        let case_insensitive = element.attribute("matchCase").is_some_and(|v| v.eq_ignore_ascii_case("false"));
        if case_insensitive && operator == ComparisonOperator::Equal && field.field_type == FieldType::String {
            return comparison(field, ComparisonOperator::ILike, Literal::String(escape_like(value)));
        }
        comparison(field, operator, Literal::String(value.to_string()))
    }

    fn like(&self, element: &XmlElement) -> Result<FilterExpression> {
        let field = self.field(element)?;
        let raw = self.literal(element, "Literal")?;
        let pattern = like_pattern(
            raw,
            element.attribute("wildCard").unwrap_or("*"),
            element.attribute("singleChar").unwrap_or("."),
            element
                .attribute("escapeChar")
                .or_else(|| element.attribute("escape"))
                .unwrap_or("!"),
        );
        let operator = if element.attribute("matchCase").is_some_and(|v| v.eq_ignore_ascii_case("false")) {
            ComparisonOperator::ILike
        } else {
            ComparisonOperator::Like
        };
        comparison(field, operator, Literal::String(pattern))
    }

    fn between(&self, element: &XmlElement) -> Result<FilterExpression> {
        let field = self.field(element)?;
        let bound = |name: &str| -> Result<Literal> {
            let boundary = element
                .child(name)
                .ok_or_else(|| GeoqueryError::parse(format!("Expected <{}>", name), locator(element)))?;
            Ok(Literal::String(self.literal(boundary, "Literal")?.to_string()))
        };
        between(field, bound("LowerBoundary")?, bound("UpperBoundary")?)
    }

    /// Identifier elements become an `In` on the primary key
    fn identifiers(&self, elements: &[XmlElement]) -> Result<FilterExpression> {
        let key = self.ctx.fields.primary_key()?;
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            let raw = ["rid", "fid", "id"]
                .iter()
                .find_map(|name| element.attribute(name))
                .ok_or_else(|| GeoqueryError::parse("Identifier without an id attribute", locator(element)))?;
            values.push(identifier_literal(key, raw));
        }
        in_list(key, values, &self.ctx.limits, "fes:ResourceId")
    }

    fn geometry(&self, element: &XmlElement) -> Result<Geometry> {
        let geometry = element
            .children
            .iter()
            .find(|c| is_geometry_element(&c.name))
            .ok_or_else(|| GeoqueryError::parse("Expected a GML geometry operand", locator(element)))?;
        Ok(self.ctx.geometry.parse_gml_element(geometry)?.geometry)
    }

    fn spatial(&self, element: &XmlElement, predicate: SpatialPredicate) -> Result<FilterExpression> {
        let name = self.property_name(element).map(strip_prefix);
        // Only BBOX may omit the value reference
        if name.is_none() && predicate != SpatialPredicate::BBox {
            return Err(GeoqueryError::parse(
                "Expected <ValueReference> or <PropertyName>",
                locator(element),
            ));
        }
        let field = self.ctx.fields.geometry(name, locator(element))?;
        let geometry = self.geometry(element)?;

        let filter = match predicate {
            SpatialPredicate::DWithin => {
                SpatialFilter::dwithin(field.name.clone(), geometry, self.distance(element)?)
            }
            SpatialPredicate::Relate => {
                let pattern = element
                    .attribute("pattern")
                    .or_else(|| element.attribute("intersectionPattern"))
                    .or_else(|| element.child("Pattern").map(XmlElement::text))
                    .ok_or_else(|| GeoqueryError::parse("Expected a DE-9IM pattern", locator(element)))?;
                SpatialFilter::relate(field.name.clone(), geometry, check_relate_pattern(pattern, locator(element))?)
            }
            other => SpatialFilter::new(other, field.name.clone(), geometry),
        };
        Ok(FilterExpression::Spatial(filter))
    }

    fn distance(&self, element: &XmlElement) -> Result<Distance> {
        let distance = element
            .child("Distance")
            .ok_or_else(|| GeoqueryError::parse("Expected <Distance>", locator(element)))?;
        let value: f64 = distance
            .text()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| {
                GeoqueryError::parse(format!("Invalid distance '{}'", distance.text()), "fes:Distance")
            })?;
        let unit = match distance.attribute("uom").or_else(|| distance.attribute("units")) {
            Some(token) => DistanceUnit::from_token(token).ok_or_else(|| {
                GeoqueryError::parse(format!("Unknown distance unit '{}'", token), "fes:Distance")
            })?,
            None => DistanceUnit::Meters,
        };
        Ok(Distance::new(value, unit))
    }
}

/// Drop a namespace prefix from a property path such as `app:name`
fn strip_prefix(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

/// Identifiers are often written `layer.42`; numeric keys keep only the
/// trailing segment
fn identifier_literal(key: &FieldDefinition, raw: &str) -> Literal {
    match key.field_type {
        FieldType::Integer => {
            let id = raw.rsplit_once('.').map_or(raw, |(_, id)| id);
            Literal::String(id.to_string())
        }
        _ => Literal::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoquery_core::error::ErrorKind;
    use geoquery_core::models::{Crs, FieldCatalog, ParserLimits};
    use geoquery_geo::GeometryParser;

    const NS: &str = r#"xmlns:fes="http://www.opengis.net/fes/2.0" xmlns:gml="http://www.opengis.net/gml/3.2""#;

    fn catalog() -> FieldCatalog {
        FieldCatalog::new(vec![
            FieldDefinition::new("id", FieldType::Integer),
            FieldDefinition::new("name", FieldType::String),
            FieldDefinition::new("age", FieldType::Integer),
            FieldDefinition::geometry("geom", Crs::wgs84()),
        ])
        .with_primary_key("id")
    }

    fn parse(body: &str) -> Result<FilterExpression> {
        let catalog = catalog();
        let geometry = GeometryParser::default();
        let ctx = FilterContext::new(&catalog, &geometry, ParserLimits::default());
        FesParser.parse(&format!("<fes:Filter {}>{}</fes:Filter>", NS, body), &ctx)
    }

    #[test]
    fn test_comparison_coerces_literal() {
        let expr = parse(
            "<fes:PropertyIsGreaterThan><fes:ValueReference>age</fes:ValueReference>\
             <fes:Literal>30</fes:Literal></fes:PropertyIsGreaterThan>",
        )
        .unwrap();
        assert_eq!(
            expr,
            FilterExpression::comparison("age", ComparisonOperator::GreaterThan, Literal::Integer(30))
        );
    }

    #[test]
    fn test_literal_first_flips() {
        let expr = parse(
            "<fes:PropertyIsLessThan><fes:Literal>30</fes:Literal>\
             <fes:ValueReference>age</fes:ValueReference></fes:PropertyIsLessThan>",
        )
        .unwrap();
        assert_eq!(
            expr,
            FilterExpression::comparison("age", ComparisonOperator::GreaterThan, Literal::Integer(30))
        );
    }

    #[test]
    fn test_like_pattern_translation() {
        assert_eq!(like_pattern("Ma*n.", "*", ".", "!"), "Ma%n_");
        assert_eq!(like_pattern("100!%*", "*", ".", "!"), "100\\%%");
        assert_eq!(like_pattern("a_b", "*", ".", "!"), "a\\_b");

        let expr = parse(
            r##"<fes:PropertyIsLike wildCard="*" singleChar="#" escapeChar="\" matchCase="false">
                 <fes:ValueReference>name</fes:ValueReference><fes:Literal>main*</fes:Literal>
               </fes:PropertyIsLike>"##,
        )
        .unwrap();
        assert_eq!(
            expr,
            FilterExpression::comparison("name", ComparisonOperator::ILike, Literal::String("main%".into()))
        );
    }

    #[test]
    fn test_case_insensitive_equality() {
        let expr = parse(
            r#"<fes:PropertyIsEqualTo matchCase="false"><fes:ValueReference>name</fes:ValueReference>
               <fes:Literal>50%_off</fes:Literal></fes:PropertyIsEqualTo>"#,
        )
        .unwrap();
        assert_eq!(
            expr,
            FilterExpression::comparison(
                "name",
                ComparisonOperator::ILike,
                Literal::String("50\\%\\_off".into())
            )
        );
    }

    #[test]
    fn test_resource_ids() {
        let expr = parse(r#"<fes:ResourceId rid="roads.1"/><fes:ResourceId rid="roads.2"/>"#).unwrap();
        assert_eq!(
            expr,
            FilterExpression::In { field: "id".into(), values: vec![Literal::Integer(1), Literal::Integer(2)] }
        );
    }

    #[test]
    fn test_bbox_defaults_geometry_field() {
        let expr = parse(
            "<fes:BBOX><gml:Envelope srsName=\"EPSG:4326\"><gml:lowerCorner>0 0</gml:lowerCorner>\
             <gml:upperCorner>10 10</gml:upperCorner></gml:Envelope></fes:BBOX>",
        )
        .unwrap();
        let FilterExpression::Spatial(filter) = expr else { panic!("expected spatial") };
        assert_eq!(filter.predicate, SpatialPredicate::BBox);
        assert_eq!(filter.field, "geom");
    }

    #[test]
    fn test_beyond_is_negated_dwithin() {
        let expr = parse(
            "<fes:Beyond><fes:ValueReference>geom</fes:ValueReference>\
             <gml:Point srsName=\"EPSG:4326\"><gml:pos>1 2</gml:pos></gml:Point>\
             <fes:Distance uom=\"km\">3</fes:Distance></fes:Beyond>",
        )
        .unwrap();
        let FilterExpression::Logical { operator: LogicalOperator::Not, operands } = expr else {
            panic!("expected NOT");
        };
        let FilterExpression::Spatial(filter) = &operands[0] else { panic!("expected spatial") };
        assert_eq!(filter.distance, Some(Distance::meters(3000.0)));
    }

    #[test]
    fn test_unknown_element_and_doctype() {
        let err = parse("<fes:During/>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("fes:During"), "{}", err);

        let catalog = catalog();
        let geometry = GeometryParser::default();
        let ctx = FilterContext::new(&catalog, &geometry, ParserLimits::default());
        let hostile = r#"<?xml version="1.0"?><!DOCTYPE f [<!ENTITY x SYSTEM "file:///etc/passwd">]>
            <Filter><PropertyIsEqualTo><ValueReference>name</ValueReference><Literal>&x;</Literal></PropertyIsEqualTo></Filter>"#;
        assert_eq!(FesParser.parse(hostile, &ctx).unwrap_err().kind(), ErrorKind::Parse);
    }
}
