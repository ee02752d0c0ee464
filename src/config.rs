//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::time::{self, TimeError};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub time: TimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Kind of archive backing the sample source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// `name,timestamp,value` CSV file
    #[default]
    Csv,
    /// SQLite archive database
    Sqlite,
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("unknown source kind '{}'", other)),
        }
    }
}

/// Sample source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    #[serde(default = "default_source_path")]
    pub path: PathBuf,

    #[serde(default = "default_cache")]
    pub cache: bool,

    /// SQLite database holding the samples recorded before `history_cutover`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_path: Option<PathBuf>,

    /// Time string or archive ticks; windows starting earlier read the
    /// history database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_cutover: Option<String>,
}

fn default_source_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("archiveql").join("samples.csv"))
        .unwrap_or_else(|| PathBuf::from("./samples.csv"))
}

fn default_cache() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            path: default_source_path(),
            cache: default_cache(),
            history_path: None,
            history_cutover: None,
        }
    }
}

/// Time string configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Read and print times in UTC, ignoring `timezone`
    #[serde(default)]
    pub gmt: bool,
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            gmt: false,
        }
    }
}

impl TimeConfig {
    /// Zone used to interpret time strings
    pub fn zone(&self) -> Result<Tz, TimeError> {
        if self.gmt {
            Ok(chrono_tz::UTC)
        } else {
            time::zone(&self.timezone)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<(Self, LoadReport), ConfigError> {
        let mut config = Self::load(path)?;
        let report = LoadReport {
            loaded_from: Some(path.to_path_buf()),
            problems: config.apply_overrides(|key| std::env::var(key).ok()),
        };
        Ok((config, report))
    }

    /// Load from default locations or environment
    ///
    /// Nothing is logged here: this runs before logging is set up, so the
    /// caller logs the returned report once it is.
    pub fn load_default() -> (Self, LoadReport) {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("archiveql").join("config.toml")),
            Some(PathBuf::from("/etc/archiveql/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::search(&config_paths, |key| std::env::var(key).ok())
    }

    /// Load the first usable file among `paths`, then apply overrides
    fn search(paths: &[PathBuf], var: impl Fn(&str) -> Option<String>) -> (Self, LoadReport) {
        let mut report = LoadReport::default();
        let mut config = Config::default();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load(path) {
                Ok(loaded) => {
                    config = loaded;
                    report.loaded_from = Some(path.clone());
                    break;
                }
                Err(e) => report.problems.push(e),
            }
        }

        report.problems.extend(config.apply_overrides(var));
        (config, report)
    }

    /// Apply overrides, returning the ones that were ignored
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Vec<ConfigError> {
        let mut ignored = Vec::new();

        // Source overrides
        if let Some(kind) = var("ARCHIVEQL_SOURCE_KIND") {
            match kind.parse() {
                Ok(kind) => self.source.kind = kind,
                Err(error) => ignored.push(ConfigError::Override {
                    var: "ARCHIVEQL_SOURCE_KIND",
                    error,
                }),
            }
        }
        if let Some(path) = var("ARCHIVEQL_SOURCE_PATH") {
            self.source.path = PathBuf::from(path);
        }

        // Time overrides
        if let Some(timezone) = var("ARCHIVEQL_TIMEZONE") {
            self.time.timezone = timezone;
        }

        // Logging overrides
        if let Some(level) = var("ARCHIVEQL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("ARCHIVEQL_LOG_FORMAT") {
            self.logging.format = format;
        }

        ignored
    }
}

/// Where the configuration came from and what was skipped on the way
#[derive(Debug, Default)]
pub struct LoadReport {
    /// File the configuration was read from, `None` for defaults
    pub loaded_from: Option<PathBuf>,

    /// Unusable files and ignored overrides, in the order they were met
    pub problems: Vec<ConfigError>,
}

impl LoadReport {
    /// Log the outcome; call once the subscriber is installed
    pub fn log(&self) {
        match &self.loaded_from {
            Some(path) => tracing::info!("Loaded config from {:?}", path),
            None => tracing::debug!("Using default config with environment overrides"),
        }
        for problem in &self.problems {
            tracing::warn!("{}", problem);
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Ignoring {var}: {error}")]
    Override { var: &'static str, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# archiveql Configuration
#
# Environment variables override these settings:
# - ARCHIVEQL_SOURCE_KIND
# - ARCHIVEQL_SOURCE_PATH
# - ARCHIVEQL_TIMEZONE
# - ARCHIVEQL_LOG_LEVEL
# - ARCHIVEQL_LOG_FORMAT

[source]
# Archive kind: csv (name,timestamp,value file) or sqlite (archive database)
kind = "csv"

# Path to the CSV file or SQLite database
path = "~/.local/share/archiveql/samples.csv"

# Remember the last fetched window per variable
cache = true

# SQLite only: older archive database, read for windows that start before
# the cutover (a time string or archive ticks)
# history_path = "/data/archive-history.db"
# history_cutover = "2018-01-01 00:00"

[time]
# Time zone for reading and printing time strings
timezone = "America/New_York"

# Use UTC instead of the time zone above
gmt = false

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
