//! Geometry command implementation

use super::read_argument;
use crate::cli::{GeometryArgs, GeometryFormat};
use crate::output::OutputWriter;
use crate::output_types::GeometryOutput;
use anyhow::Result;
use geoquery_core::config::LayeredConfig;
use geoquery_core::models::Crs;
use geoquery_geo::GeometryParser;

pub fn execute(args: GeometryArgs, config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let service = config.service_policy()?;
    let input = read_argument(&args.input)?;
    let crs = args.crs.as_deref().map(Crs::parse).transpose()?;

    let parser = GeometryParser::from_policy(&service).with_default_crs(crs.or(service.default_crs));
    let parsed = match args.format {
        GeometryFormat::Auto => parser.parse(&input)?,
        GeometryFormat::Gml => parser.parse_gml(&input)?,
        GeometryFormat::Geojson => parser.parse_geojson(&input)?,
        GeometryFormat::Esri => parser.parse_esri(&input)?,
        GeometryFormat::Wkt => parser.parse_wkt(&input)?,
    };

    if parsed.repaired {
        output.warning("Geometry was invalid and has been repaired");
    }

    let geometry = &parsed.geometry;
    let result = GeometryOutput {
        geometry_type: format!("{:?}", geometry.geometry_type()),
        crs: geometry.crs.to_string(),
        vertices: geometry.vertex_count(),
        repaired: parsed.repaired,
        bbox: parsed.bbox,
        geojson: geometry.to_geojson(),
    };

    if output.is_json() {
        return output.result(result);
    }

    output.kv("Type", &result.geometry_type);
    output.kv("CRS", &result.crs);
    output.kv("Vertices", result.vertices);
    if let Some(bbox) = &result.bbox {
        output.kv("BBox", format!("{}, {}, {}, {}", bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y));
    }
    output.data(&result.geojson)?;
    output.success("Geometry is valid");
    Ok(())
}
