//! Config command implementation

use crate::output::OutputWriter;
use crate::output_types::ConfigEntry;
use anyhow::Result;
use geoquery_core::config::LayeredConfig;

pub fn execute(config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let mut entries: Vec<ConfigEntry> = config
        .to_inspection_map()
        .into_iter()
        .map(|(key, (value, source))| ConfigEntry { key, value, source: format!("{:?}", source).to_lowercase() })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    // Surfaces invalid combinations the individual layers could not catch
    let policy = config.service_policy();

    if output.is_json() {
        policy?;
        return output.result(entries);
    }

    output.section("Configuration");
    for entry in &entries {
        output.kv(&entry.key, format!("{} ({})", entry.value, entry.source));
    }
    if let Err(e) = policy {
        output.warning(e);
    }
    Ok(())
}
