//! Parse command implementation

use super::read_argument;
use crate::catalog::LayerCatalog;
use crate::cli::ParseArgs;
use crate::output::OutputWriter;
use crate::output_types::ParseOutput;
use anyhow::{Context, Result};
use geoquery_core::config::LayeredConfig;
use geoquery_core::models::Crs;
use geoquery_filter::{parse_filter, FilterContext, FilterDialect};
use geoquery_geo::GeometryParser;
use std::path::Path;

pub fn execute(args: ParseArgs, layers: &Path, config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let catalog = LayerCatalog::load(layers)?;
    let layer = catalog.layer(&args.layer)?;
    let service = config.service_policy()?;
    let input = read_argument(&args.filter)?;

    let dialect = match args.lang.as_deref() {
        Some(lang) => lang.parse::<FilterDialect>()?,
        None => FilterDialect::detect(&input),
    };
    let filter_crs = args.filter_crs.as_deref().map(Crs::parse).transpose()?;

    let geometry = GeometryParser::from_policy(&service).with_default_crs(filter_crs.or(service.default_crs));
    let ctx = FilterContext::from_policy(&layer.catalog, &geometry, &service);
    let filter = parse_filter(&input, Some(dialect.name()), &ctx).context("Failed to parse filter")?;

    if !output.is_json() {
        output.kv("Layer", &layer.name);
        output.kv("Dialect", dialect);
        if geometry.consumed_vertices() > 0 {
            output.kv("Geometry vertices", geometry.consumed_vertices());
        }
    }

    output.result(ParseOutput { layer: layer.name.clone(), dialect: dialect.name().to_string(), filter })
}
