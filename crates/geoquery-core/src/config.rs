use crate::error::{GeoqueryError, Result};
use crate::models::{
    Crs, ParserLimits, ServicePolicy, SpatialFallback, ValidityMode, ABSOLUTE_MAX_LIMIT,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Where a setting came from; later variants take precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfigSource {
    Default,
    File,
    Environment,
    Cli,
}

/// A setting paired with the layer that supplied it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Replace the value unless the current one came from a stronger layer
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source > self.source {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered configuration for the query engine
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    pub default_limit: ConfigValue<u32>,
    pub max_record_count: ConfigValue<Option<u32>>,
    pub absolute_max_limit: ConfigValue<u32>,
    pub default_crs: ConfigValue<Crs>,
    pub max_filter_depth: ConfigValue<usize>,
    pub max_geometry_vertices: ConfigValue<usize>,
    pub max_total_vertices: ConfigValue<usize>,
    pub max_in_values: ConfigValue<usize>,
    pub geometry_validity: ConfigValue<ValidityMode>,
    pub spatial_fallback: ConfigValue<SpatialFallback>,
    pub query_timeout_ms: ConfigValue<Option<u64>>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        let parser = ParserLimits::default();
        Self {
            default_limit: ConfigValue::new(10, ConfigSource::Default),
            max_record_count: ConfigValue::new(None, ConfigSource::Default),
            absolute_max_limit: ConfigValue::new(ABSOLUTE_MAX_LIMIT, ConfigSource::Default),
            default_crs: ConfigValue::new(Crs::wgs84(), ConfigSource::Default),
            max_filter_depth: ConfigValue::new(parser.max_filter_depth, ConfigSource::Default),
            max_geometry_vertices: ConfigValue::new(
                parser.max_geometry_vertices,
                ConfigSource::Default,
            ),
            max_total_vertices: ConfigValue::new(parser.max_total_vertices, ConfigSource::Default),
            max_in_values: ConfigValue::new(parser.max_in_values, ConfigSource::Default),
            geometry_validity: ConfigValue::new(ValidityMode::Lenient, ConfigSource::Default),
            spatial_fallback: ConfigValue::new(SpatialFallback::Reject, ConfigSource::Default),
            query_timeout_ms: ConfigValue::new(None, ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| GeoqueryError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| GeoqueryError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        let source = ConfigSource::File;
        if let Some(v) = file_config.default_limit {
            self.default_limit.update(v, source);
        }
        if let Some(v) = file_config.max_record_count {
            self.max_record_count.update(Some(v), source);
        }
        if let Some(v) = file_config.absolute_max_limit {
            self.absolute_max_limit.update(v, source);
        }
        if let Some(v) = file_config.default_crs {
            self.default_crs.update(v, source);
        }
        if let Some(v) = file_config.max_filter_depth {
            self.max_filter_depth.update(v, source);
        }
        if let Some(v) = file_config.max_geometry_vertices {
            self.max_geometry_vertices.update(v, source);
        }
        if let Some(v) = file_config.max_total_vertices {
            self.max_total_vertices.update(v, source);
        }
        if let Some(v) = file_config.max_in_values {
            self.max_in_values.update(v, source);
        }
        if let Some(v) = file_config.geometry_validity {
            self.geometry_validity.update(v, source);
        }
        if let Some(v) = file_config.spatial_fallback {
            self.spatial_fallback.update(v, source);
        }
        if let Some(v) = file_config.query_timeout_ms {
            self.query_timeout_ms.update(Some(v), source);
        }

        Ok(self)
    }

    /// Load configuration from `GEOQUERY_*` environment variables
    pub fn load_from_env(mut self) -> Self {
        env_override(&mut self.default_limit, "GEOQUERY_DEFAULT_LIMIT", str::parse, "a positive integer");
        env_override(
            &mut self.max_record_count,
            "GEOQUERY_MAX_RECORD_COUNT",
            |s| s.parse().map(Some),
            "a positive integer",
        );
        env_override(
            &mut self.absolute_max_limit,
            "GEOQUERY_ABSOLUTE_MAX_LIMIT",
            str::parse,
            "a positive integer",
        );
        env_override(&mut self.default_crs, "GEOQUERY_DEFAULT_CRS", Crs::parse, "a CRS identifier such as EPSG:4326");
        env_override(&mut self.max_filter_depth, "GEOQUERY_MAX_FILTER_DEPTH", str::parse, "a positive integer");
        env_override(
            &mut self.max_geometry_vertices,
            "GEOQUERY_MAX_GEOMETRY_VERTICES",
            str::parse,
            "a positive integer",
        );
        env_override(
            &mut self.max_total_vertices,
            "GEOQUERY_MAX_TOTAL_VERTICES",
            str::parse,
            "a positive integer",
        );
        env_override(&mut self.max_in_values, "GEOQUERY_MAX_IN_VALUES", str::parse, "a positive integer");
        env_override(
            &mut self.geometry_validity,
            "GEOQUERY_GEOMETRY_VALIDITY",
            parse_validity_mode,
            "strict or lenient",
        );
        env_override(
            &mut self.spatial_fallback,
            "GEOQUERY_SPATIAL_FALLBACK",
            parse_spatial_fallback,
            "reject or bbox",
        );
        env_override(
            &mut self.query_timeout_ms,
            "GEOQUERY_QUERY_TIMEOUT_MS",
            |s| s.parse().map(Some),
            "milliseconds as an integer",
        );

        self
    }

    /// Update configuration from CLI arguments
    pub fn update_from_cli(&mut self, overrides: CliConfigOverrides) {
        let source = ConfigSource::Cli;
        if let Some(v) = overrides.default_limit {
            self.default_limit.update(v, source);
        }
        if let Some(v) = overrides.max_record_count {
            self.max_record_count.update(Some(v), source);
        }
        if let Some(v) = overrides.default_crs {
            self.default_crs.update(v, source);
        }
        if let Some(v) = overrides.max_filter_depth {
            self.max_filter_depth.update(v, source);
        }
        if let Some(v) = overrides.geometry_validity {
            self.geometry_validity.update(v, source);
        }
        if let Some(v) = overrides.spatial_fallback {
            self.spatial_fallback.update(v, source);
        }
        if let Some(v) = overrides.query_timeout_ms {
            self.query_timeout_ms.update(Some(v), source);
        }
    }

    /// Snapshot the layered values into the read-only policy the engine consumes
    pub fn service_policy(&self) -> Result<ServicePolicy> {
        let positive = |key: &str, value: usize| {
            if value == 0 {
                Err(GeoqueryError::ConfigInvalid {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                })
            } else {
                Ok(value)
            }
        };

        let absolute_max_limit = self.absolute_max_limit.value;
        if absolute_max_limit == 0 || absolute_max_limit > ABSOLUTE_MAX_LIMIT {
            return Err(GeoqueryError::ConfigInvalid {
                key: "absolute_max_limit".to_string(),
                reason: format!("must be between 1 and {}", ABSOLUTE_MAX_LIMIT),
            });
        }
        positive("default_limit", self.default_limit.value as usize)?;
        if self.max_record_count.value == Some(0) {
            return Err(GeoqueryError::ConfigInvalid {
                key: "max_record_count".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(ServicePolicy {
            default_limit: self.default_limit.value,
            max_record_count: self.max_record_count.value,
            absolute_max_limit,
            default_crs: Some(self.default_crs.value),
            parser: ParserLimits {
                max_filter_depth: positive("max_filter_depth", self.max_filter_depth.value)?,
                max_geometry_vertices: positive(
                    "max_geometry_vertices",
                    self.max_geometry_vertices.value,
                )?,
                max_total_vertices: positive("max_total_vertices", self.max_total_vertices.value)?,
                max_in_values: positive("max_in_values", self.max_in_values.value)?,
            },
            geometry_validity: self.geometry_validity.value,
            spatial_fallback: self.spatial_fallback.value,
            query_timeout: self.query_timeout_ms.value.map(Duration::from_millis),
        })
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        fn optional<T: Display>(value: &Option<T>) -> String {
            value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "unset".to_string())
        }

        let mut map = HashMap::new();
        let mut insert = |key: &str, value: String, source: ConfigSource| {
            map.insert(key.to_string(), (value, source));
        };

        insert("default_limit", self.default_limit.value.to_string(), self.default_limit.source);
        insert(
            "max_record_count",
            optional(&self.max_record_count.value),
            self.max_record_count.source,
        );
        insert(
            "absolute_max_limit",
            self.absolute_max_limit.value.to_string(),
            self.absolute_max_limit.source,
        );
        insert("default_crs", self.default_crs.value.to_string(), self.default_crs.source);
        insert(
            "max_filter_depth",
            self.max_filter_depth.value.to_string(),
            self.max_filter_depth.source,
        );
        insert(
            "max_geometry_vertices",
            self.max_geometry_vertices.value.to_string(),
            self.max_geometry_vertices.source,
        );
        insert(
            "max_total_vertices",
            self.max_total_vertices.value.to_string(),
            self.max_total_vertices.source,
        );
        insert("max_in_values", self.max_in_values.value.to_string(), self.max_in_values.source);
        insert(
            "geometry_validity",
            format!("{:?}", self.geometry_validity.value),
            self.geometry_validity.source,
        );
        insert(
            "spatial_fallback",
            format!("{:?}", self.spatial_fallback.value),
            self.spatial_fallback.source,
        );
        insert(
            "query_timeout_ms",
            optional(&self.query_timeout_ms.value),
            self.query_timeout_ms.source,
        );

        map
    }
}

fn env_override<T, E>(
    target: &mut ConfigValue<T>,
    var: &str,
    parse: impl Fn(&str) -> std::result::Result<T, E>,
    expected: &str,
) {
    if let Ok(raw) = env::var(var) {
        match parse(raw.trim()) {
            Ok(value) => target.update(value, ConfigSource::Environment),
            Err(_) => tracing::warn!("Invalid {} value '{}': expected {}", var, raw, expected),
        }
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    default_limit: Option<u32>,
    max_record_count: Option<u32>,
    absolute_max_limit: Option<u32>,
    default_crs: Option<Crs>,
    max_filter_depth: Option<usize>,
    max_geometry_vertices: Option<usize>,
    max_total_vertices: Option<usize>,
    max_in_values: Option<usize>,
    geometry_validity: Option<ValidityMode>,
    spatial_fallback: Option<SpatialFallback>,
    query_timeout_ms: Option<u64>,
}

/// CLI configuration overrides
#[derive(Debug, Default)]
pub struct CliConfigOverrides {
    pub default_limit: Option<u32>,
    pub max_record_count: Option<u32>,
    pub default_crs: Option<Crs>,
    pub max_filter_depth: Option<usize>,
    pub geometry_validity: Option<ValidityMode>,
    pub spatial_fallback: Option<SpatialFallback>,
    pub query_timeout_ms: Option<u64>,
}

/// Parse validity mode from string
pub fn parse_validity_mode(s: &str) -> Result<ValidityMode> {
    match s.to_lowercase().as_str() {
        "strict" => Ok(ValidityMode::Strict),
        "lenient" => Ok(ValidityMode::Lenient),
        _ => Err(GeoqueryError::ConfigInvalid {
            key: "geometry_validity".to_string(),
            reason: format!("Invalid validity mode: {}. Use strict or lenient", s),
        }),
    }
}

/// Parse spatial fallback policy from string
pub fn parse_spatial_fallback(s: &str) -> Result<SpatialFallback> {
    match s.to_lowercase().as_str() {
        "reject" => Ok(SpatialFallback::Reject),
        "bbox" | "boundingboxonly" | "bounding_box_only" => Ok(SpatialFallback::BoundingBoxOnly),
        _ => Err(GeoqueryError::ConfigInvalid {
            key: "spatial_fallback".to_string(),
            reason: format!("Invalid spatial fallback: {}. Use reject or bbox", s),
        }),
    }
}

impl FromStr for SpatialFallback {
    type Err = GeoqueryError;

    fn from_str(s: &str) -> Result<Self> {
        parse_spatial_fallback(s)
    }
}

impl FromStr for ValidityMode {
    type Err = GeoqueryError;

    fn from_str(s: &str) -> Result<Self> {
        parse_validity_mode(s)
    }
}
