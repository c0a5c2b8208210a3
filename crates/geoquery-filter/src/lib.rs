//! geoquery-filter - CQL text, CQL2-JSON and Filter Encoding parsers
//!
//! Every dialect parses into the same [`FilterExpression`]. Field names are
//! resolved against the layer's [`FieldCatalog`], literals are coerced to the
//! declared field types, and embedded geometries go through the request's
//! [`GeometryParser`] so they share one vertex budget.

pub mod cql2_json;
pub mod cql_text;
pub mod fes;
pub mod lexer;
pub mod resolve;

pub use cql2_json::Cql2JsonParser;
pub use cql_text::CqlTextParser;
pub use fes::FesParser;
pub use resolve::FieldResolver;

use geoquery_core::error::{GeoqueryError, Result};
use geoquery_core::models::{FieldCatalog, FilterExpression, ParserLimits, ServicePolicy};
use geoquery_geo::GeometryParser;
use std::fmt;
use std::str::FromStr;

/// Everything a dialect parser needs for one request
pub struct FilterContext<'a> {
    pub fields: FieldResolver<'a>,
    pub limits: ParserLimits,
    pub geometry: &'a GeometryParser,
}

impl<'a> FilterContext<'a> {
    pub fn new(catalog: &'a FieldCatalog, geometry: &'a GeometryParser, limits: ParserLimits) -> Self {
        Self { fields: FieldResolver::new(catalog), limits, geometry }
    }

    pub fn from_policy(
        catalog: &'a FieldCatalog,
        geometry: &'a GeometryParser,
        policy: &ServicePolicy,
    ) -> Self {
        Self::new(catalog, geometry, policy.parser)
    }
}

/// A filter dialect parser
pub trait FilterParser {
    fn dialect(&self) -> FilterDialect;

    /// Parse one filter document into the canonical tree, enforcing the
    /// nesting and IN-list limits of `ctx`
    fn parse(&self, input: &str, ctx: &FilterContext<'_>) -> Result<FilterExpression>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDialect {
    CqlText,
    Cql2Json,
    Fes,
}

impl FilterDialect {
    /// Guess the dialect from the first non-whitespace character
    pub fn detect(input: &str) -> Self {
        match input.trim_start().chars().next() {
            Some('<') => FilterDialect::Fes,
            Some('{') => FilterDialect::Cql2Json,
            _ => FilterDialect::CqlText,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FilterDialect::CqlText => "cql-text",
            FilterDialect::Cql2Json => "cql2-json",
            FilterDialect::Fes => "fes",
        }
    }

    pub fn parser(&self) -> Box<dyn FilterParser> {
        match self {
            FilterDialect::CqlText => Box::new(CqlTextParser),
            FilterDialect::Cql2Json => Box::new(Cql2JsonParser),
            FilterDialect::Fes => Box::new(FesParser),
        }
    }
}

impl fmt::Display for FilterDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterDialect {
    type Err = GeoqueryError;

    /// Accepts the `filter-lang` values used by OGC API Features and WFS
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cql-text" | "cql2-text" | "cql" | "ecql" => Ok(FilterDialect::CqlText),
            "cql2-json" | "cql-json" | "json" => Ok(FilterDialect::Cql2Json),
            "fes" | "xml" | "fes-2.0" | "filter-encoding" => Ok(FilterDialect::Fes),
            other => Err(GeoqueryError::parse(
                format!("Unsupported filter language '{}'", other),
                "filter-lang",
            )),
        }
    }
}

/// Parse a filter in an explicit or auto-detected dialect
///
/// Blank input means "no filter".
pub fn parse_filter(
    input: &str,
    filter_lang: Option<&str>,
    ctx: &FilterContext<'_>,
) -> Result<Option<FilterExpression>> {
    if input.trim().is_empty() {
        return Ok(None);
    }

    let dialect = match filter_lang {
        Some(lang) => lang.parse()?,
        None => FilterDialect::detect(input),
    };
    tracing::debug!(dialect = %dialect, length = input.len(), "Parsing filter");

    dialect.parser().parse(input, ctx).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(FilterDialect::detect("  <fes:Filter/>"), FilterDialect::Fes);
        assert_eq!(FilterDialect::detect(r#"{"op":"="}"#), FilterDialect::Cql2Json);
        assert_eq!(FilterDialect::detect("a = 1"), FilterDialect::CqlText);
    }

    #[test]
    fn test_filter_lang() {
        assert_eq!("CQL2-TEXT".parse::<FilterDialect>().unwrap(), FilterDialect::CqlText);
        assert_eq!("cql2-json".parse::<FilterDialect>().unwrap(), FilterDialect::Cql2Json);
        assert!("sparql".parse::<FilterDialect>().is_err());
    }

    #[test]
    fn test_blank_filter_is_none() {
        let catalog = FieldCatalog::default();
        let geometry = GeometryParser::default();
        let ctx = FilterContext::new(&catalog, &geometry, ParserLimits::default());
        assert_eq!(parse_filter("   ", None, &ctx).unwrap(), None);
    }
}
