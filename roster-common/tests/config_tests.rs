//! Tests for config file resolution and graceful degradation
//!
//! Note: Uses serial_test to prevent ENV variable race conditions.
//! Tests that manipulate ROSTER_CONFIG are marked with #[serial].

use roster_common::config::{load_toml_config, ConfigFileResolver, LoggingConfig, CONFIG_ENV_VAR};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Default, Deserialize, PartialEq)]
struct SampleConfig {
    #[serde(default)]
    bind_addr: Option<String>,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
#[serial]
fn test_cli_path_takes_precedence_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/roster-from-env.toml");

    let resolver = ConfigFileResolver::new("test-module")
        .with_cli_path(Some(PathBuf::from("/tmp/roster-from-cli.toml")));

    assert_eq!(resolver.resolve(), Some(PathBuf::from("/tmp/roster-from-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli_path() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/roster-from-env.toml");

    let resolver = ConfigFileResolver::new("test-module");
    assert_eq!(resolver.resolve(), Some(PathBuf::from("/tmp/roster-from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "   ");

    // Module name is unique so no user/system file can exist for it
    let resolver = ConfigFileResolver::new("roster-test-module-that-does-not-exist");
    assert_eq!(resolver.resolve(), None);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_no_path_yields_defaults() {
    let config: SampleConfig = load_toml_config(None).unwrap();
    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_missing_file_yields_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent.toml");

    let config: SampleConfig = load_toml_config(Some(&path)).unwrap();
    assert_eq!(config, SampleConfig::default());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_file_values_are_loaded() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("roster.toml");
    std::fs::write(
        &path,
        "bind_addr = \"0.0.0.0:9000\"\n\n[logging]\nlevel = \"debug\"\n",
    )
    .unwrap();

    let config: SampleConfig = load_toml_config(Some(&path)).unwrap();
    assert_eq!(config.bind_addr.as_deref(), Some("0.0.0.0:9000"));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "bind_addr = [unterminated").unwrap();

    let result: roster_common::Result<SampleConfig> = load_toml_config(Some(&path));
    match result {
        Err(roster_common::Error::Config(msg)) => assert!(msg.contains("Parse")),
        other => panic!("expected config error, got {:?}", other),
    }
}
