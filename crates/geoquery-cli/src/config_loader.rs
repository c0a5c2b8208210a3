//! Configuration loading utilities for CLI commands

use crate::cli::OverrideArgs;
use anyhow::{Context, Result};
use geoquery_core::config::{parse_spatial_fallback, parse_validity_mode, CliConfigOverrides, LayeredConfig};
use geoquery_core::models::Crs;
use std::path::{Path, PathBuf};

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "geoquery.toml";

/// Defaults, then the config file, then `GEOQUERY_*` variables, then flags
pub fn load_config(path: Option<&Path>, overrides: &OverrideArgs) -> Result<LayeredConfig> {
    let mut config = LayeredConfig::with_defaults();

    if let Some(path) = config_path(path) {
        tracing::debug!(path = %path.display(), "Loading configuration file");
        config = config
            .load_from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    }

    let mut config = config.load_from_env();
    config.update_from_cli(cli_overrides(overrides)?);
    Ok(config)
}

fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            fallback.is_file().then_some(fallback)
        }
    }
}

fn cli_overrides(args: &OverrideArgs) -> Result<CliConfigOverrides> {
    Ok(CliConfigOverrides {
        default_limit: args.default_limit,
        max_record_count: args.max_record_count,
        default_crs: args.default_crs.as_deref().map(Crs::parse).transpose()?,
        max_filter_depth: args.max_filter_depth,
        geometry_validity: args.validity.as_deref().map(parse_validity_mode).transpose()?,
        spatial_fallback: args.spatial_fallback.as_deref().map(parse_spatial_fallback).transpose()?,
        query_timeout_ms: args.timeout_ms,
    })
}
