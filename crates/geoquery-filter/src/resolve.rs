//! Field resolution, literal coercion and resource limits shared by all
//! three dialects

use chrono::{DateTime, NaiveDate, Utc};
use geoquery_core::error::{GeoqueryError, Result};
use geoquery_core::models::{
    ComparisonOperator, FieldCatalog, FieldDefinition, FieldType, FilterExpression, Literal,
    LogicalOperator, ParserLimits, SpatialPredicate,
};

/// Resolves filter field names against a layer's catalog
#[derive(Debug, Clone, Copy)]
pub struct FieldResolver<'a> {
    catalog: &'a FieldCatalog,
}

impl<'a> FieldResolver<'a> {
    pub fn new(catalog: &'a FieldCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &'a FieldCatalog {
        self.catalog
    }

    /// Resolve a name case-insensitively to a queryable field
    ///
    /// Unknown names are parse errors located at the offending token.
    pub fn resolve(&self, name: &str, locator: impl Into<String>) -> Result<&'a FieldDefinition> {
        let field = self.catalog.resolve(name).ok_or_else(|| {
            GeoqueryError::parse(format!("Unknown field '{}'", name), locator)
        })?;
        if !field.queryable {
            return Err(GeoqueryError::field_validation(
                &field.name,
                "Field is not queryable",
            ));
        }
        Ok(field)
    }

    /// Resolve a field used in a non-spatial comparison
    pub fn property(&self, name: &str, locator: impl Into<String>) -> Result<&'a FieldDefinition> {
        let field = self.resolve(name, locator)?;
        if field.is_geometry() {
            return Err(GeoqueryError::field_validation(
                &field.name,
                "Geometry fields can only be used in spatial predicates",
            ));
        }
        Ok(field)
    }

    /// Resolve the geometry operand of a spatial predicate, defaulting to
    /// the catalog's geometry field
    pub fn geometry(
        &self,
        name: Option<&str>,
        locator: impl Into<String>,
    ) -> Result<&'a FieldDefinition> {
        let field = match name {
            Some(name) => self.resolve(name, locator)?,
            None => self.catalog.geometry_field().ok_or_else(|| {
                GeoqueryError::validation("Layer has no geometry field for spatial filtering")
            })?,
        };
        if !field.is_geometry() {
            return Err(GeoqueryError::field_validation(
                &field.name,
                "Spatial predicates require a geometry field",
            ));
        }
        Ok(field)
    }

    /// The primary key, used for identifier filters
    pub fn primary_key(&self) -> Result<&'a FieldDefinition> {
        let name = self
            .catalog
            .primary_key
            .as_deref()
            .ok_or_else(|| GeoqueryError::validation("Layer has no primary key for identifier filters"))?;
        self.resolve(name, "ResourceId")
    }
}

/// Parse an RFC 3339 timestamp
pub fn parse_timestamp(raw: &str, locator: impl Into<String>) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GeoqueryError::parse(format!("Invalid timestamp '{}': {}", raw, e), locator))
}

/// Parse a `YYYY-MM-DD` date as midnight UTC
pub fn parse_date(raw: &str, locator: impl Into<String>) -> Result<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| GeoqueryError::parse(format!("Invalid date '{}'", raw), locator))
}

fn mismatch(field: &FieldDefinition, literal: &Literal) -> GeoqueryError {
    GeoqueryError::field_validation(
        &field.name,
        format!(
            "Cannot compare {:?} field with {} value {}",
            field.field_type,
            literal.type_name(),
            literal
        ),
    )
}

/// Coerce a literal to the declared type of the field it is compared with
pub fn coerce(field: &FieldDefinition, literal: Literal) -> Result<Literal> {
    let coerced = match (field.field_type, &literal) {
        (FieldType::String, Literal::String(_)) => literal,
        (FieldType::String, Literal::DateTime(t)) => Literal::String(t.to_rfc3339()),
        (FieldType::String, Literal::Integer(i)) => Literal::String(i.to_string()),
        (FieldType::String, Literal::Double(d)) => Literal::String(d.to_string()),
        (FieldType::String, Literal::Boolean(b)) => Literal::String(b.to_string()),

        (FieldType::Integer, Literal::Integer(_)) => literal,
        (FieldType::Integer, Literal::Double(d)) if d.fract() == 0.0 && d.abs() < 9.0e15 => {
            Literal::Integer(*d as i64)
        }
        (FieldType::Integer, Literal::String(s)) => {
            Literal::Integer(s.trim().parse().map_err(|_| mismatch(field, &literal))?)
        }

        (FieldType::Double, Literal::Double(_)) => literal,
        (FieldType::Double, Literal::Integer(i)) => Literal::Double(*i as f64),
        (FieldType::Double, Literal::String(s)) => {
            Literal::Double(s.trim().parse().map_err(|_| mismatch(field, &literal))?)
        }

        (FieldType::Boolean, Literal::Boolean(_)) => literal,
        (FieldType::Boolean, Literal::String(s)) if s.eq_ignore_ascii_case("true") => {
            Literal::Boolean(true)
        }
        (FieldType::Boolean, Literal::String(s)) if s.eq_ignore_ascii_case("false") => {
            Literal::Boolean(false)
        }

        (FieldType::DateTime, Literal::DateTime(_)) => literal,
        (FieldType::DateTime, Literal::String(s)) => {
            let parsed = parse_timestamp(s, &field.name).or_else(|_| parse_date(s, &field.name));
            Literal::DateTime(parsed.map_err(|_| mismatch(field, &literal))?)
        }

        _ => return Err(mismatch(field, &literal)),
    };
    Ok(coerced)
}

/// Build a comparison, coercing the value unless it is a LIKE pattern
pub fn comparison(
    field: &FieldDefinition,
    operator: ComparisonOperator,
    value: Literal,
) -> Result<FilterExpression> {
    let value = if operator.is_pattern() {
        match value {
            Literal::String(_) => value,
            other => {
                return Err(GeoqueryError::field_validation(
                    &field.name,
                    format!("LIKE patterns must be strings, found {}", other.type_name()),
                ))
            }
        }
    } else {
        coerce(field, value)?
    };
    Ok(FilterExpression::comparison(field.name.clone(), operator, value))
}

pub fn between(field: &FieldDefinition, lower: Literal, upper: Literal) -> Result<FilterExpression> {
    Ok(FilterExpression::Between {
        field: field.name.clone(),
        lower: coerce(field, lower)?,
        upper: coerce(field, upper)?,
    })
}

/// Build an `IN` list; a single value becomes an equality comparison
pub fn in_list(
    field: &FieldDefinition,
    values: Vec<Literal>,
    limits: &ParserLimits,
    locator: impl Into<String>,
) -> Result<FilterExpression> {
    if values.is_empty() {
        return Err(GeoqueryError::parse("IN list must not be empty", locator));
    }
    if values.len() > limits.max_in_values {
        return Err(GeoqueryError::parse(
            format!("IN list has {} values, the maximum is {}", values.len(), limits.max_in_values),
            locator,
        ));
    }

    let mut values = values
        .into_iter()
        .map(|value| coerce(field, value))
        .collect::<Result<Vec<_>>>()?;

    if values.len() == 1 {
        let value = values.remove(0);
        return Ok(FilterExpression::comparison(field.name.clone(), ComparisonOperator::Equal, value));
    }
    Ok(FilterExpression::In { field: field.name.clone(), values })
}

/// Map a spatial operator name from any dialect (`S_INTERSECTS`,
/// `intersects`, `DWithin`, ...) to its predicate; the flag marks `Beyond`,
/// which is a negated `DWithin`
pub fn spatial_operator(name: &str) -> Option<(SpatialPredicate, bool)> {
    let lower = name.to_ascii_lowercase();
    let bare = lower.strip_prefix("s_").unwrap_or(&lower);
    let operator = match bare {
        "bbox" => (SpatialPredicate::BBox, false),
        "intersects" => (SpatialPredicate::Intersects, false),
        "contains" => (SpatialPredicate::Contains, false),
        "within" => (SpatialPredicate::Within, false),
        "touches" => (SpatialPredicate::Touches, false),
        "crosses" => (SpatialPredicate::Crosses, false),
        "overlaps" => (SpatialPredicate::Overlaps, false),
        "disjoint" => (SpatialPredicate::Disjoint, false),
        "equals" => (SpatialPredicate::Equals, false),
        "dwithin" => (SpatialPredicate::DWithin, false),
        "beyond" => (SpatialPredicate::DWithin, true),
        "relate" | "relation" => (SpatialPredicate::Relate, false),
        _ => return None,
    };
    Some(operator)
}

/// Numeric literal: integers stay integral, anything else is a double
pub fn number_literal(text: &str, locator: impl Into<String>) -> Result<Literal> {
    if let Ok(value) = text.parse::<i64>() {
        return Ok(Literal::Integer(value));
    }
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Literal::Double(value)),
        _ => Err(GeoqueryError::parse(format!("Invalid number '{}'", text), locator)),
    }
}

/// Combine operands under one logical node; a single operand stands alone
pub fn combine(operator: LogicalOperator, mut operands: Vec<FilterExpression>) -> FilterExpression {
    if operands.len() == 1 && operator != LogicalOperator::Not {
        return operands.remove(0);
    }
    FilterExpression::Logical { operator, operands }
}

/// Reject recursion past the configured nesting depth
pub fn check_nesting(depth: usize, limits: &ParserLimits, locator: impl Into<String>) -> Result<()> {
    if depth > limits.max_filter_depth {
        return Err(GeoqueryError::parse(
            format!("Filter nesting exceeds the maximum depth of {}", limits.max_filter_depth),
            locator,
        ));
    }
    Ok(())
}

/// Reject a finished tree deeper than the configured cap
pub fn check_depth(expression: &FilterExpression, limits: &ParserLimits) -> Result<()> {
    check_nesting(expression.depth(), limits, "filter")
}

/// Validate a DE-9IM intersection pattern
pub fn check_relate_pattern(pattern: &str, locator: impl Into<String>) -> Result<String> {
    let upper = pattern.trim().to_ascii_uppercase();
    if upper.len() != 9 || !upper.chars().all(|c| matches!(c, 'T' | 'F' | '0' | '1' | '2' | '*')) {
        return Err(GeoqueryError::parse(
            format!("Invalid DE-9IM pattern '{}': expected 9 characters from T, F, 0, 1, 2, *", pattern),
            locator,
        ));
    }
    Ok(upper)
}

/// Swap the rows and columns of a checked DE-9IM pattern, for use when the
/// relation's operands trade places
pub fn transpose_relate_pattern(pattern: &str) -> String {
    let cells: Vec<char> = pattern.chars().collect();
    (0..9).map(|i| cells[(i % 3) * 3 + i / 3]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoquery_core::error::ErrorKind;
    use geoquery_core::models::Crs;

    fn catalog() -> FieldCatalog {
        FieldCatalog::new(vec![
            FieldDefinition::new("id", FieldType::Integer),
            FieldDefinition::new("status", FieldType::String),
            FieldDefinition::new("area", FieldType::Double),
            FieldDefinition::new("active", FieldType::Boolean),
            FieldDefinition::new("updated", FieldType::DateTime),
            FieldDefinition::new("secret", FieldType::String).hidden(),
            FieldDefinition::geometry("geom", Crs::wgs84()),
        ])
        .with_primary_key("id")
    }

    #[test]
    fn test_resolution_rules() {
        let catalog = catalog();
        let resolver = FieldResolver::new(&catalog);

        assert_eq!(resolver.resolve("STATUS", "byte 0").unwrap().name, "status");
        assert_eq!(resolver.resolve("nope", "byte 3").unwrap_err().kind(), ErrorKind::Parse);
        assert_eq!(resolver.resolve("secret", "byte 0").unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(resolver.property("geom", "byte 0").unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(resolver.geometry(None, "bbox").unwrap().name, "geom");
        assert!(resolver.geometry(Some("status"), "bbox").is_err());
        assert_eq!(resolver.primary_key().unwrap().name, "id");
    }

    #[test]
    fn test_coercion() {
        let catalog = catalog();
        let field = |name| catalog.resolve(name).unwrap();

        assert_eq!(coerce(field("id"), Literal::String("42".into())).unwrap(), Literal::Integer(42));
        assert_eq!(coerce(field("id"), Literal::Double(3.0)).unwrap(), Literal::Integer(3));
        assert!(coerce(field("id"), Literal::Double(3.5)).is_err());
        assert_eq!(coerce(field("area"), Literal::Integer(2)).unwrap(), Literal::Double(2.0));
        assert_eq!(coerce(field("active"), Literal::String("TRUE".into())).unwrap(), Literal::Boolean(true));
        assert_eq!(coerce(field("status"), Literal::Integer(7)).unwrap(), Literal::String("7".into()));
        assert!(matches!(
            coerce(field("updated"), Literal::String("2024-03-01".into())).unwrap(),
            Literal::DateTime(_)
        ));

        let err = coerce(field("active"), Literal::Integer(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_in_list_rules() {
        let catalog = catalog();
        let status = catalog.resolve("status").unwrap();
        let limits = ParserLimits { max_in_values: 2, ..ParserLimits::default() };

        let single = in_list(status, vec![Literal::String("a".into())], &limits, "x").unwrap();
        assert_eq!(
            single,
            FilterExpression::comparison("status", ComparisonOperator::Equal, Literal::String("a".into()))
        );

        let values = vec![Literal::String("a".into()); 3];
        assert_eq!(in_list(status, values, &limits, "x").unwrap_err().kind(), ErrorKind::Parse);
        assert!(in_list(status, vec![], &limits, "x").is_err());
    }

    #[test]
    fn test_spatial_operator_names() {
        assert_eq!(spatial_operator("S_INTERSECTS"), Some((SpatialPredicate::Intersects, false)));
        assert_eq!(spatial_operator("DWithin"), Some((SpatialPredicate::DWithin, false)));
        assert_eq!(spatial_operator("Beyond"), Some((SpatialPredicate::DWithin, true)));
        assert_eq!(spatial_operator("BBOX"), Some((SpatialPredicate::BBox, false)));
        assert_eq!(spatial_operator("t_before"), None);
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(number_literal("42", "x").unwrap(), Literal::Integer(42));
        assert_eq!(number_literal("-1.5e3", "x").unwrap(), Literal::Double(-1500.0));
        assert!(number_literal("1e999", "x").is_err());
        assert!(number_literal("1..2", "x").is_err());
    }

    #[test]
    fn test_relate_pattern() {
        assert_eq!(check_relate_pattern("t*f**f***", "x").unwrap(), "T*F**F***");
        assert!(check_relate_pattern("T*F", "x").is_err());
        assert!(check_relate_pattern("T*F**F**X", "x").is_err());
        assert_eq!(transpose_relate_pattern("T*F**F***"), "T*****FF*");
        assert_eq!(transpose_relate_pattern(&transpose_relate_pattern("012TF*21F")), "012TF*21F");
    }
}
