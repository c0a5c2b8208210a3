use geoquery_core::models::{BoundingBox, FilterExpression, SqlFragment};
use serde::Serialize;

/// Output for parse command
#[derive(Debug, Serialize)]
pub struct ParseOutput {
    pub layer: String,
    pub dialect: String,
    pub filter: Option<FilterExpression>,
}

/// Output for translate command
#[derive(Debug, Serialize)]
pub struct TranslateOutput {
    pub layer: String,
    pub backend: String,
    pub envelope_only: bool,
    pub limit: u32,
    pub offset: u64,
    pub count: Option<SqlFragment>,
    pub fetch: Option<SqlFragment>,
    /// Present with `--execute`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionOutput>,
}

#[derive(Debug, Serialize)]
pub struct ExecutionOutput {
    pub number_matched: Option<u64>,
    pub features: usize,
    pub statements: Vec<StatementOutput>,
}

#[derive(Debug, Serialize)]
pub struct StatementOutput {
    pub kind: String,
    pub sql: String,
    pub params: usize,
}

/// Output for geometry command
#[derive(Debug, Serialize)]
pub struct GeometryOutput {
    pub geometry_type: String,
    pub crs: String,
    pub vertices: usize,
    pub repaired: bool,
    pub bbox: Option<BoundingBox>,
    pub geojson: serde_json::Value,
}

/// Output for config command
#[derive(Debug, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub source: String,
}
