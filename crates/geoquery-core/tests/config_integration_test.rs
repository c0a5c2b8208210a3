//! Integration tests for layered configuration
//!
//! These tests verify that configuration loading follows the correct precedence:
//! CLI arguments > Environment variables > Config file > Defaults

use geoquery_core::config::{CliConfigOverrides, ConfigSource, LayeredConfig};
use geoquery_core::models::{Crs, SpatialFallback, ValidityMode};
use serial_test::serial;
use std::env;
use std::fs;
use std::io::Write;
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

const ENV_VARS: &[&str] = &[
    "GEOQUERY_DEFAULT_LIMIT",
    "GEOQUERY_MAX_RECORD_COUNT",
    "GEOQUERY_DEFAULT_CRS",
    "GEOQUERY_GEOMETRY_VALIDITY",
    "GEOQUERY_SPATIAL_FALLBACK",
    "GEOQUERY_QUERY_TIMEOUT_MS",
];

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

#[test]
fn test_default_configuration() {
    let config = LayeredConfig::with_defaults();

    assert_eq!(config.default_limit.value, 10);
    assert_eq!(config.max_record_count.value, None);
    assert_eq!(config.max_geometry_vertices.value, 10_000);
    assert_eq!(config.max_total_vertices.value, 1_000_000);
    assert_eq!(config.geometry_validity.value, ValidityMode::Lenient);
    assert_eq!(config.spatial_fallback.value, SpatialFallback::Reject);
    assert_eq!(config.query_timeout_ms.source, ConfigSource::Default);
}

#[test]
fn test_partial_file_configuration() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
max_record_count = 1000
# Only override the service maximum, leave others as defaults
"#
    )
    .unwrap();

    let config = LayeredConfig::with_defaults().load_from_file(file.path()).unwrap();

    assert_eq!(config.max_record_count.value, Some(1000));
    assert_eq!(config.max_record_count.source, ConfigSource::File);
    assert_eq!(config.default_limit.source, ConfigSource::Default);
    assert_eq!(config.default_crs.source, ConfigSource::Default);
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    env::set_var("GEOQUERY_DEFAULT_LIMIT", "50");
    env::set_var("GEOQUERY_DEFAULT_CRS", "urn:ogc:def:crs:EPSG::3857");
    env::set_var("GEOQUERY_SPATIAL_FALLBACK", "bbox");

    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
default_limit = 20
default_crs = "EPSG:25832"
"#
    )
    .unwrap();

    let config = LayeredConfig::with_defaults()
        .load_from_file(file.path())
        .unwrap()
        .load_from_env();

    assert_eq!(config.default_limit.value, 50);
    assert_eq!(config.default_limit.source, ConfigSource::Environment);
    assert_eq!(config.default_crs.value, Crs::web_mercator());
    assert_eq!(config.spatial_fallback.value, SpatialFallback::BoundingBoxOnly);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_environment_value_is_ignored() {
    clear_env();
    env::set_var("GEOQUERY_DEFAULT_LIMIT", "lots");
    env::set_var("GEOQUERY_GEOMETRY_VALIDITY", "sometimes");

    let config = LayeredConfig::with_defaults().load_from_env();

    assert_eq!(config.default_limit.value, 10);
    assert_eq!(config.default_limit.source, ConfigSource::Default);
    assert_eq!(config.geometry_validity.source, ConfigSource::Default);

    clear_env();
}

#[test]
#[serial]
fn test_full_configuration_workflow() {
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("geoquery.toml");
    fs::write(
        &config_path,
        r#"
default_limit = 20
max_record_count = 2000
geometry_validity = "Strict"
query_timeout_ms = 5000
"#,
    )
    .unwrap();

    env::set_var("GEOQUERY_MAX_RECORD_COUNT", "1500");
    env::set_var("GEOQUERY_QUERY_TIMEOUT_MS", "3000");

    let mut config = LayeredConfig::with_defaults()
        .load_from_file(&config_path)
        .unwrap()
        .load_from_env();

    assert_eq!(config.default_limit.value, 20);
    assert_eq!(config.max_record_count.value, Some(1500));
    assert_eq!(config.max_record_count.source, ConfigSource::Environment);

    config.update_from_cli(CliConfigOverrides {
        query_timeout_ms: Some(100),
        ..Default::default()
    });

    let policy = config.service_policy().unwrap();
    assert_eq!(policy.default_limit, 20);
    assert_eq!(policy.max_record_count, Some(1500));
    assert_eq!(policy.geometry_validity, ValidityMode::Strict);
    assert_eq!(policy.query_timeout, Some(Duration::from_millis(100)));

    let inspection = config.to_inspection_map();
    assert_eq!(inspection["query_timeout_ms"], ("100".to_string(), ConfigSource::Cli));
    assert_eq!(inspection["default_limit"].1, ConfigSource::File);

    clear_env();
}

#[test]
fn test_unusable_config_files_are_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let cases = [
        ("broken.toml", Some("default_limit = [[[")),
        ("bad_crs.toml", Some("default_crs = \"not-a-crs\"")),
        ("bad_validity.toml", Some("geometry_validity = \"Sometimes\"")),
        ("absent.toml", None),
    ];

    for (name, content) in cases {
        let path = temp_dir.path().join(name);
        if let Some(content) = content {
            fs::write(&path, content).unwrap();
        }
        let result = LayeredConfig::with_defaults().load_from_file(&path);
        assert!(result.is_err(), "{} should not load", name);
    }
}
