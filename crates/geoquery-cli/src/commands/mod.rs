//! Command implementations

mod config;
mod geometry;
mod parse;
mod translate;

use crate::cli::{Cli, Commands};
use crate::config_loader::load_config;
use crate::output::OutputWriter;
use anyhow::{Context, Result};
use std::fs;

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let output = OutputWriter::new(cli.json);
    let config = load_config(cli.config.as_deref(), &cli.overrides)?;

    match cli.command {
        Commands::Parse(args) => parse::execute(args, &cli.layers, &config, &output),
        Commands::Translate(args) => translate::execute(args, &cli.layers, &config, &output).await,
        Commands::Geometry(args) => geometry::execute(args, &config, &output),
        Commands::Config => config::execute(&config, &output),
    }
}

/// Inline text, or the contents of a file for `@path`
pub(crate) fn read_argument(raw: &str) -> Result<String> {
    match raw.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("Failed to read {}", path)),
        None => Ok(raw.to_string()),
    }
}
