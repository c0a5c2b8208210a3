//! Canonical filter expression tree
//!
//! CQL text, CQL2-JSON and Filter Encoding documents all parse into
//! [`FilterExpression`]. Every backend translator matches on it
//! exhaustively, so adding a node kind is a compile error until each
//! backend handles it.

use super::geometry::{Distance, Geometry, SpatialPredicate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed literal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Literal {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
}

impl Literal {
    /// Whether two literals denote the same value, used for IN de-duplication.
    /// Doubles compare by bit pattern so NaN never sneaks past as distinct.
    pub fn same_value(&self, other: &Literal) -> bool {
        match (self, other) {
            (Literal::Double(a), Literal::Double(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::String(_) => "string",
            Literal::Integer(_) => "integer",
            Literal::Double(_) => "double",
            Literal::Boolean(_) => "boolean",
            Literal::DateTime(_) => "timestamp",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Double(d) => write!(f, "{}", d),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::DateTime(t) => write!(f, "TIMESTAMP('{}')", t.to_rfc3339()),
        }
    }
}

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// Pattern match; `%` and `_` are wildcards, `\` escapes
    Like,
    /// Case-insensitive pattern match
    ILike,
}

impl ComparisonOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Equal => "=",
            ComparisonOperator::NotEqual => "<>",
            ComparisonOperator::LessThan => "<",
            ComparisonOperator::LessThanOrEqual => "<=",
            ComparisonOperator::GreaterThan => ">",
            ComparisonOperator::GreaterThanOrEqual => ">=",
            ComparisonOperator::Like => "LIKE",
            ComparisonOperator::ILike => "ILIKE",
        }
    }

    /// Operator to use when the operands are swapped (`5 < x` is `x > 5`)
    pub fn flipped(&self) -> Self {
        match self {
            ComparisonOperator::LessThan => ComparisonOperator::GreaterThan,
            ComparisonOperator::LessThanOrEqual => ComparisonOperator::GreaterThanOrEqual,
            ComparisonOperator::GreaterThan => ComparisonOperator::LessThan,
            ComparisonOperator::GreaterThanOrEqual => ComparisonOperator::LessThanOrEqual,
            other => *other,
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, ComparisonOperator::Like | ComparisonOperator::ILike)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

/// Spatial predicate applied to a geometry field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialFilter {
    pub predicate: SpatialPredicate,
    pub field: String,
    pub geometry: Geometry,
    /// Always normalized to meters; present only for DWithin
    pub distance: Option<Distance>,
    /// Nine-character DE-9IM pattern; present only for Relate
    pub pattern: Option<String>,
}

impl SpatialFilter {
    pub fn new(predicate: SpatialPredicate, field: impl Into<String>, geometry: Geometry) -> Self {
        Self { predicate, field: field.into(), geometry, distance: None, pattern: None }
    }

    pub fn dwithin(field: impl Into<String>, geometry: Geometry, distance: Distance) -> Self {
        Self {
            distance: Some(distance.normalized()),
            ..Self::new(SpatialPredicate::DWithin, field, geometry)
        }
    }

    pub fn relate(field: impl Into<String>, geometry: Geometry, pattern: impl Into<String>) -> Self {
        Self { pattern: Some(pattern.into()), ..Self::new(SpatialPredicate::Relate, field, geometry) }
    }
}

/// Canonical filter tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FilterExpression {
    Comparison {
        field: String,
        operator: ComparisonOperator,
        value: Literal,
    },
    Between {
        field: String,
        lower: Literal,
        upper: Literal,
    },
    In {
        field: String,
        values: Vec<Literal>,
    },
    IsNull {
        field: String,
        negated: bool,
    },
    Logical {
        operator: LogicalOperator,
        operands: Vec<FilterExpression>,
    },
    Spatial(SpatialFilter),
}

impl FilterExpression {
    pub fn comparison(field: impl Into<String>, operator: ComparisonOperator, value: Literal) -> Self {
        FilterExpression::Comparison { field: field.into(), operator, value }
    }

    pub fn not(operand: FilterExpression) -> Self {
        FilterExpression::Logical { operator: LogicalOperator::Not, operands: vec![operand] }
    }

    /// Conjunction of the given expressions; a single operand is returned as-is
    pub fn and(mut operands: Vec<FilterExpression>) -> Option<Self> {
        match operands.len() {
            0 => None,
            1 => operands.pop(),
            _ => Some(FilterExpression::Logical { operator: LogicalOperator::And, operands }),
        }
    }

    /// Disjunction of the given expressions; a single operand is returned as-is
    pub fn or(mut operands: Vec<FilterExpression>) -> Option<Self> {
        match operands.len() {
            0 => None,
            1 => operands.pop(),
            _ => Some(FilterExpression::Logical { operator: LogicalOperator::Or, operands }),
        }
    }

    /// Height of the tree; a leaf has depth 1
    pub fn depth(&self) -> usize {
        match self {
            FilterExpression::Logical { operands, .. } => {
                1 + operands.iter().map(FilterExpression::depth).max().unwrap_or(0)
            }
            _ => 1,
        }
    }

    /// Field names referenced anywhere in the tree, in visiting order
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterExpression::Comparison { field, .. }
            | FilterExpression::Between { field, .. }
            | FilterExpression::In { field, .. }
            | FilterExpression::IsNull { field, .. } => out.push(field),
            FilterExpression::Spatial(spatial) => out.push(&spatial.field),
            FilterExpression::Logical { operands, .. } => {
                for operand in operands {
                    operand.collect_fields(out);
                }
            }
        }
    }

    /// Whether any node is a spatial predicate
    pub fn has_spatial(&self) -> bool {
        match self {
            FilterExpression::Spatial(_) => true,
            FilterExpression::Logical { operands, .. } => operands.iter().any(Self::has_spatial),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf() -> FilterExpression {
        FilterExpression::comparison("pop", ComparisonOperator::GreaterThan, Literal::Integer(10))
    }

    #[test]
    fn test_depth_counts_nodes_on_longest_path() {
        assert_eq!(leaf().depth(), 1);

        let mut expr = leaf();
        for _ in 0..10 {
            expr = FilterExpression::not(expr);
        }
        assert_eq!(expr.depth(), 11);

        let wide = FilterExpression::and(vec![leaf(), FilterExpression::not(leaf()), leaf()]).unwrap();
        assert_eq!(wide.depth(), 3);
    }

    #[test]
    fn test_and_collapses_single_operand() {
        assert_eq!(FilterExpression::and(vec![leaf()]), Some(leaf()));
        assert_eq!(FilterExpression::and(vec![]), None);
    }

    #[test]
    fn test_flipped_operator() {
        assert_eq!(ComparisonOperator::LessThan.flipped(), ComparisonOperator::GreaterThan);
        assert_eq!(ComparisonOperator::Equal.flipped(), ComparisonOperator::Equal);
    }

    #[test]
    fn test_fields_visits_every_leaf() {
        let expr = FilterExpression::and(vec![
            leaf(),
            FilterExpression::IsNull { field: "name".into(), negated: true },
        ])
        .unwrap();
        assert_eq!(expr.fields(), vec!["pop", "name"]);
        assert!(!expr.has_spatial());
    }
}
