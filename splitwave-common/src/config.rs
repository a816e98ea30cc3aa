//! Configuration loading and root folder resolution
//!
//! Every setting follows the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! The resolved [`ServiceConfig`] is built once at start-up and handed to each
//! component explicitly.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5002;

/// Default bind host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Minutes a session may sit idle before the sweep removes it
pub const DEFAULT_RETENTION_MINUTES: u64 = 120;

/// Seconds a single analysis or separation job may run
pub const DEFAULT_PROCESSING_TIMEOUT_SECONDS: u64 = 120;

/// Largest accepted upload (50 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub const ENV_ROOT_FOLDER: &str = "SPLITWAVE_ROOT_FOLDER";
pub const ENV_PORT: &str = "SPLITWAVE_PORT";
pub const ENV_RETENTION_MINUTES: &str = "SPLITWAVE_RETENTION_MINUTES";
pub const ENV_PROCESSING_TIMEOUT_SECONDS: &str = "SPLITWAVE_PROCESSING_TIMEOUT_SECONDS";

/// Settings read from the TOML file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub retention_minutes: Option<u64>,
    #[serde(default)]
    pub processing_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub root_folder: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub retention_minutes: Option<u64>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Folder holding the session registry and all artifacts
    pub root_folder: PathBuf,
    pub host: String,
    pub port: u16,
    /// Idle minutes before a session is swept
    pub retention_minutes: u64,
    /// Deadline for one CPU-bound analysis or separation job
    pub processing_timeout_seconds: u64,
    pub max_upload_bytes: usize,
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Compiled defaults rooted at the given folder
    pub fn with_root_folder(root_folder: impl Into<PathBuf>) -> Self {
        Self {
            root_folder: root_folder.into(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            retention_minutes: DEFAULT_RETENTION_MINUTES,
            processing_timeout_seconds: DEFAULT_PROCESSING_TIMEOUT_SECONDS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            logging: LoggingConfig::default(),
        }
    }

    /// Resolve configuration from CLI overrides, environment, TOML and defaults
    ///
    /// A missing TOML file is not an error; a malformed one is.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let toml_path = overrides.config_file.clone().or_else(default_config_file);
        let file = match toml_path {
            Some(path) => load_toml_config(&path)?.unwrap_or_default(),
            None => TomlConfig::default(),
        };

        let root_folder = overrides
            .root_folder
            .clone()
            .or_else(|| std::env::var(ENV_ROOT_FOLDER).ok().map(PathBuf::from))
            .or(file.root_folder)
            .unwrap_or_else(default_root_folder);

        let port = overrides
            .port
            .or_else(|| env_value(ENV_PORT))
            .or(file.port)
            .unwrap_or(DEFAULT_PORT);

        let retention_minutes = overrides
            .retention_minutes
            .or_else(|| env_value(ENV_RETENTION_MINUTES))
            .or(file.retention_minutes)
            .unwrap_or(DEFAULT_RETENTION_MINUTES);

        let processing_timeout_seconds = env_value(ENV_PROCESSING_TIMEOUT_SECONDS)
            .or(file.processing_timeout_seconds)
            .unwrap_or(DEFAULT_PROCESSING_TIMEOUT_SECONDS);

        if processing_timeout_seconds == 0 {
            return Err(Error::Config(
                "processing_timeout_seconds must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            root_folder,
            host: overrides
                .host
                .clone()
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            retention_minutes,
            processing_timeout_seconds,
            max_upload_bytes: file.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            logging: file.logging,
        })
    }

    /// SQLite session registry
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("splitwave.db")
    }

    /// Directory holding one sub-directory per session
    pub fn sessions_dir(&self) -> PathBuf {
        self.root_folder.join("sessions")
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_seconds)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse a TOML config file
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    Ok(Some(config))
}

/// Platform config file location (`<config_dir>/splitwave/config.toml`)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("splitwave").join("config.toml"))
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("splitwave"))
        .unwrap_or_else(|| PathBuf::from("./splitwave_data"))
}

fn env_value<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", name, raw);
            None
        }
    }
}
