//! Unit tests for configuration resolution
//!
//! Tests cover:
//! - Compiled defaults when nothing is configured
//! - Priority order: CLI → ENV → TOML → defaults
//! - Missing TOML files are not fatal, malformed ones are
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate SPLITWAVE_* variables are marked with #[serial].

use serial_test::serial;
use splitwave_common::config::{
    load_toml_config, ConfigOverrides, ServiceConfig, DEFAULT_MAX_UPLOAD_BYTES,
    DEFAULT_PROCESSING_TIMEOUT_SECONDS, DEFAULT_RETENTION_MINUTES, ENV_PORT,
    ENV_PROCESSING_TIMEOUT_SECONDS, ENV_RETENTION_MINUTES, ENV_ROOT_FOLDER,
};
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    env::remove_var(ENV_ROOT_FOLDER);
    env::remove_var(ENV_PORT);
    env::remove_var(ENV_RETENTION_MINUTES);
    env::remove_var(ENV_PROCESSING_TIMEOUT_SECONDS);
}

/// Overrides pointing at a config file that does not exist
fn no_file_overrides(dir: &TempDir) -> ConfigOverrides {
    ConfigOverrides {
        config_file: Some(dir.path().join("missing.toml")),
        ..Default::default()
    }
}

#[test]
#[serial]
fn test_defaults_when_nothing_configured() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let config = ServiceConfig::resolve(&no_file_overrides(&dir)).unwrap();

    assert_eq!(config.retention_minutes, DEFAULT_RETENTION_MINUTES);
    assert_eq!(config.retention_minutes, 120);
    assert_eq!(config.processing_timeout_seconds, DEFAULT_PROCESSING_TIMEOUT_SECONDS);
    assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    assert_eq!(config.logging.level, "info");
    assert!(!config.root_folder.as_os_str().is_empty());
}

#[test]
#[serial]
fn test_toml_values_are_applied() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
root_folder = "/tmp/splitwave-toml"
port = 6001
retention_minutes = 30
processing_timeout_seconds = 45

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let overrides = ConfigOverrides {
        config_file: Some(path),
        ..Default::default()
    };
    let config = ServiceConfig::resolve(&overrides).unwrap();

    assert_eq!(config.root_folder, PathBuf::from("/tmp/splitwave-toml"));
    assert_eq!(config.port, 6001);
    assert_eq!(config.retention_minutes, 30);
    assert_eq!(config.processing_timeout_seconds, 45);
    assert_eq!(config.logging.level, "debug");
}

#[test]
#[serial]
fn test_env_beats_toml_and_cli_beats_env() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "retention_minutes = 30\nroot_folder = \"/tmp/from-toml\"\n").unwrap();

    env::set_var(ENV_RETENTION_MINUTES, "45");
    env::set_var(ENV_ROOT_FOLDER, "/tmp/from-env");

    let overrides = ConfigOverrides {
        config_file: Some(path.clone()),
        ..Default::default()
    };
    let config = ServiceConfig::resolve(&overrides).unwrap();
    assert_eq!(config.retention_minutes, 45);
    assert_eq!(config.root_folder, PathBuf::from("/tmp/from-env"));

    let overrides = ConfigOverrides {
        config_file: Some(path),
        root_folder: Some(PathBuf::from("/tmp/from-cli")),
        retention_minutes: Some(5),
        ..Default::default()
    };
    let config = ServiceConfig::resolve(&overrides).unwrap();
    assert_eq!(config.retention_minutes, 5);
    assert_eq!(config.root_folder, PathBuf::from("/tmp/from-cli"));

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_value_is_ignored() {
    clear_env();
    let dir = TempDir::new().unwrap();
    env::set_var(ENV_RETENTION_MINUTES, "two hours");

    let config = ServiceConfig::resolve(&no_file_overrides(&dir)).unwrap();
    assert_eq!(config.retention_minutes, DEFAULT_RETENTION_MINUTES);

    clear_env();
}

#[test]
#[serial]
fn test_zero_processing_timeout_rejected() {
    clear_env();
    let dir = TempDir::new().unwrap();
    env::set_var(ENV_PROCESSING_TIMEOUT_SECONDS, "0");

    let result = ServiceConfig::resolve(&no_file_overrides(&dir));
    assert!(result.is_err());

    clear_env();
}

#[test]
fn test_missing_toml_returns_none() {
    let dir = TempDir::new().unwrap();
    let loaded = load_toml_config(&dir.path().join("nope.toml")).unwrap();
    assert!(loaded.is_none());
}

#[test]
fn test_malformed_toml_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "retention_minutes = \"many\"").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(err.to_string().contains("Configuration error"));
}

#[test]
fn test_derived_paths() {
    let config = ServiceConfig::with_root_folder("/srv/splitwave");
    assert_eq!(config.database_path(), PathBuf::from("/srv/splitwave/splitwave.db"));
    assert_eq!(config.sessions_dir(), PathBuf::from("/srv/splitwave/sessions"));
    assert_eq!(config.bind_address(), "127.0.0.1:5002");
    assert_eq!(config.processing_timeout().as_secs(), 120);
}
