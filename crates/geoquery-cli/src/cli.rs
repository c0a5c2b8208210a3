use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// geoquery - OGC filter and feature query translation
#[derive(Parser, Debug)]
#[command(name = "geoquery")]
#[command(about = "Parse OGC filters and translate feature queries to spatial SQL", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Service configuration file (TOML); defaults to ./geoquery.toml when present
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Layer catalog file (TOML)
    #[arg(long, global = true, value_name = "FILE", default_value = "layers.toml")]
    pub layers: PathBuf,

    #[command(flatten)]
    pub overrides: OverrideArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Configuration values that win over file and environment
#[derive(Parser, Debug, Default)]
pub struct OverrideArgs {
    /// Page size when the request has no limit
    #[arg(long, global = true)]
    pub default_limit: Option<u32>,

    /// Service-wide maximum page size
    #[arg(long, global = true)]
    pub max_record_count: Option<u32>,

    /// CRS assumed for geometries that declare none (e.g. EPSG:4326)
    #[arg(long, global = true)]
    pub default_crs: Option<String>,

    /// Maximum nesting of logical operators in a filter
    #[arg(long, global = true)]
    pub max_filter_depth: Option<usize>,

    /// Geometry validity mode (strict or lenient)
    #[arg(long, global = true)]
    pub validity: Option<String>,

    /// Behaviour when the backend has no spatial SQL (reject or bbox)
    #[arg(long, global = true)]
    pub spatial_fallback: Option<String>,

    /// Query deadline in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a filter and print its canonical tree
    Parse(ParseArgs),

    /// Translate request parameters into SQL for a backend
    Translate(TranslateArgs),

    /// Parse and validate a geometry
    Geometry(GeometryArgs),

    /// Show the effective configuration and where each value came from
    Config,
}

#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Filter text, or @path to read it from a file
    pub filter: String,

    /// Layer whose fields the filter refers to
    #[arg(long)]
    pub layer: String,

    /// Filter language (cql-text, cql2-json, fes); detected when omitted
    #[arg(long)]
    pub lang: Option<String>,

    /// CRS of geometries in the filter that declare none
    #[arg(long)]
    pub filter_crs: Option<String>,
}

#[derive(Parser, Debug)]
pub struct TranslateArgs {
    /// Layer to query
    #[arg(long)]
    pub layer: String,

    /// Target database
    #[arg(long, value_enum, default_value = "postgres")]
    pub backend: Backend,

    /// Request parameters as key=value (e.g. limit=5 "filter=status='open'")
    #[arg(value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Also build the count statement for a results request
    #[arg(long)]
    pub count: bool,

    /// Run the plan against a recording store and list the statements it receives
    #[arg(long)]
    pub execute: bool,
}

/// Database selection for translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// PostgreSQL with PostGIS
    Postgres,
    /// MySQL 8
    Mysql,
    /// SQL Server
    Sqlserver,
    /// SQLite with the SpatiaLite extension
    Spatialite,
    /// Plain SQLite / GeoPackage without spatial SQL
    Sqlite,
}

#[derive(Parser, Debug)]
pub struct GeometryArgs {
    /// Geometry text, or @path to read it from a file
    pub input: String,

    /// Input encoding; detected when auto
    #[arg(long, value_enum, default_value = "auto")]
    pub format: GeometryFormat,

    /// CRS for input that declares none
    #[arg(long)]
    pub crs: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GeometryFormat {
    Auto,
    Gml,
    Geojson,
    Esri,
    Wkt,
}
