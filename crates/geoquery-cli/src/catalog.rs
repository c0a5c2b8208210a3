//! Layer catalog file
//!
//! ```toml
//! [[layers]]
//! name = "incidents"
//! table = "incidents"
//! schema = "public"
//! primary_key = "id"
//! temporal_field = "opened"
//! fields = [
//!     { name = "id", type = "integer" },
//!     { name = "status", type = "string" },
//!     { name = "opened", type = "datetime" },
//!     { name = "geom", type = "geometry", srid = "EPSG:4326" },
//! ]
//! ```

use anyhow::{bail, Context, Result};
use geoquery_core::models::LayerPolicy;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct LayerCatalog {
    #[serde(default)]
    pub layers: Vec<LayerPolicy>,
}

impl LayerCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read layer catalog {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid layer catalog {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let catalog: LayerCatalog = toml::from_str(content)?;
        for (i, layer) in catalog.layers.iter().enumerate() {
            if catalog.layers[..i].iter().any(|other| other.name.eq_ignore_ascii_case(&layer.name)) {
                bail!("Layer '{}' is declared twice", layer.name);
            }
            if let Some(pk) = &layer.catalog.primary_key {
                if layer.catalog.resolve(pk).is_none() {
                    bail!("Layer '{}': primary key '{}' is not a declared field", layer.name, pk);
                }
            }
            if let Some(field) = &layer.temporal_field {
                if layer.catalog.resolve(field).is_none() {
                    bail!("Layer '{}': temporal field '{}' is not a declared field", layer.name, field);
                }
            }
        }
        Ok(catalog)
    }

    pub fn layer(&self, name: &str) -> Result<&LayerPolicy> {
        self.layers.iter().find(|l| l.name.eq_ignore_ascii_case(name)).with_context(|| {
            let known: Vec<&str> = self.layers.iter().map(|l| l.name.as_str()).collect();
            format!("Unknown layer '{}'. Known layers: {}", name, known.join(", "))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoquery_core::models::{Crs, FieldType};

    const CATALOG: &str = r#"
[[layers]]
name = "incidents"
table = "incidents"
schema = "public"
primary_key = "id"
temporal_field = "opened"
max_record_count = 500
supported_crs = ["EPSG:4326", "EPSG:3857"]
fields = [
    { name = "id", type = "integer" },
    { name = "status", type = "string" },
    { name = "opened", type = "datetime" },
    { name = "geom", type = "geometry", srid = "EPSG:4326" },
]
"#;

    #[test]
    fn test_load_layer() {
        let catalog = LayerCatalog::from_toml(CATALOG).unwrap();
        let layer = catalog.layer("INCIDENTS").unwrap();

        assert_eq!(layer.schema.as_deref(), Some("public"));
        assert_eq!(layer.max_record_count, Some(500));
        assert_eq!(layer.supported_crs, vec![Crs::wgs84(), Crs::web_mercator()]);
        assert_eq!(layer.catalog.resolve("opened").unwrap().field_type, FieldType::DateTime);
        assert_eq!(layer.geometry_crs(), Crs::wgs84());
    }

    #[test]
    fn test_unknown_layer_lists_known_ones() {
        let catalog = LayerCatalog::from_toml(CATALOG).unwrap();
        let err = catalog.layer("roads").unwrap_err().to_string();
        assert!(err.contains("incidents"));
    }

    #[test]
    fn test_primary_key_must_exist() {
        let bad = CATALOG.replace("primary_key = \"id\"", "primary_key = \"gid\"");
        assert!(LayerCatalog::from_toml(&bad).is_err());
    }
}
