//! Well-known text literals

use crate::models::{from_geo_geometry, Crs, Shape};
use geoquery_core::error::{GeoqueryError, Result};
use std::str::FromStr;
use wkt::Wkt;

/// Parse WKT, accepting an optional EWKT `SRID=<code>;` prefix
pub fn read_wkt(text: &str) -> Result<(Shape, Option<Crs>)> {
    let trimmed = text.trim();
    let (srid, body) = match trimmed.split_once(';') {
        Some((prefix, body)) if prefix.trim().to_ascii_uppercase().starts_with("SRID=") => {
            let code = prefix.trim()[5..].trim();
            (Some(Crs::parse(code)?), body)
        }
        _ => (None, trimmed),
    };

    let parsed = Wkt::<f64>::from_str(body.trim())
        .map_err(|e| GeoqueryError::parse(format!("Invalid WKT: {}", e), "wkt"))?;
    let geometry = geo::Geometry::<f64>::try_from(parsed)
        .map_err(|e| GeoqueryError::parse(format!("Unsupported WKT geometry: {}", e), "wkt"))?;

    Ok((from_geo_geometry(&geometry), srid))
}
