use serde::{Deserialize, Serialize};

use super::geometry::Crs;

/// Declared type of a layer attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Double,
    Boolean,
    DateTime,
    Geometry,
}

/// One attribute of a layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Fields may be listed but withheld from filtering and sorting
    #[serde(default = "default_true")]
    pub queryable: bool,

    /// Storage CRS of a geometry column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srid: Option<Crs>,
}

fn default_true() -> bool {
    true
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type, queryable: true, srid: None }
    }

    pub fn geometry(name: impl Into<String>, srid: Crs) -> Self {
        Self { srid: Some(srid), ..Self::new(name, FieldType::Geometry) }
    }

    pub fn hidden(mut self) -> Self {
        self.queryable = false;
        self
    }

    pub fn is_geometry(&self) -> bool {
        self.field_type == FieldType::Geometry
    }
}

/// The attributes a layer exposes to filters, sorting and projection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCatalog {
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,

    /// Geometry column used when a filter does not name one (e.g. FES BBOX)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_geometry: Option<String>,
}

impl FieldCatalog {
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self { fields, primary_key: None, default_geometry: None }
    }

    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = Some(key.into());
        self
    }

    pub fn with_default_geometry(mut self, field: impl Into<String>) -> Self {
        self.default_geometry = Some(field.into());
        self
    }

    /// Look up a field; an exact match wins over a case-insensitive one
    pub fn resolve(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
    }

    /// The default geometry column, falling back to the first declared one
    pub fn geometry_field(&self) -> Option<&FieldDefinition> {
        self.default_geometry
            .as_deref()
            .and_then(|name| self.resolve(name))
            .filter(|f| f.is_geometry())
            .or_else(|| self.fields.iter().find(|f| f.is_geometry()))
    }

    /// Non-geometry fields, in declaration order
    pub fn property_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| !f.is_geometry())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> FieldCatalog {
        FieldCatalog::new(vec![
            FieldDefinition::new("id", FieldType::Integer),
            FieldDefinition::new("Name", FieldType::String),
            FieldDefinition::new("name", FieldType::String),
            FieldDefinition::geometry("geom", Crs::wgs84()),
        ])
        .with_primary_key("id")
    }

    #[test]
    fn test_resolve_prefers_exact_case() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("name").unwrap().name, "name");
        assert_eq!(catalog.resolve("Name").unwrap().name, "Name");
        assert_eq!(catalog.resolve("ID").unwrap().name, "id");
        assert!(catalog.resolve("missing").is_none());
    }

    #[test]
    fn test_geometry_field_fallback() {
        let catalog = catalog();
        assert_eq!(catalog.geometry_field().unwrap().name, "geom");
        assert_eq!(catalog.property_fields().count(), 3);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let catalog: FieldCatalog = toml::from_str(
            r#"
primary_key = "id"
default_geometry = "shape"

[[fields]]
name = "id"
type = "integer"

[[fields]]
name = "secret"
type = "string"
queryable = false

[[fields]]
name = "shape"
type = "geometry"
srid = "EPSG:3857"
"#,
        )
        .unwrap();

        assert!(!catalog.resolve("secret").unwrap().queryable);
        assert_eq!(catalog.geometry_field().unwrap().srid, Some(Crs::web_mercator()));
    }
}
