//! Configuration management for kemono
//!
//! Handles loading and validation of kemono.toml configuration files.
//! Every section is optional; missing keys fall back to the defaults below.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name looked up under the platform config directory.
pub const CONFIG_FILE_NAME: &str = "kemono.toml";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Search debouncing settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Paging settings
    #[serde(default)]
    pub paging: PagingConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-friendly colored output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected one of: pretty, json")),
        }
    }
}

/// General configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Optional log file, appended to alongside stderr output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Search debouncing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Quiet interval after the last keystroke before a query commits
    #[serde(default = "default_quiet_interval")]
    pub quiet_interval_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            quiet_interval_ms: default_quiet_interval(),
        }
    }
}

impl SearchConfig {
    #[must_use]
    pub fn quiet_interval(&self) -> Duration {
        Duration::from_millis(self.quiet_interval_ms)
    }
}

fn default_quiet_interval() -> u64 {
    500
}

/// How a screen exposes its backing list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagingMode {
    /// Explicit page-by-page navigation
    Windowed,
    /// Scroll-triggered reveal of further items
    #[default]
    InfiniteScroll,
}

impl fmt::Display for PagingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windowed => f.write_str("windowed"),
            Self::InfiniteScroll => f.write_str("infinite_scroll"),
        }
    }
}

/// Paging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Presentation mode
    #[serde(default)]
    pub mode: PagingMode,

    /// Items per page / per reveal step
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Distance from the end of the scroll extent that triggers a reveal
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: f64,

    /// Settle delay of one reveal step
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            mode: PagingMode::default(),
            page_size: default_page_size(),
            scroll_threshold: default_scroll_threshold(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl PagingConfig {
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

fn default_page_size() -> usize {
    20
}

fn default_scroll_threshold() -> f64 {
    200.0
}

fn default_settle_delay() -> u64 {
    200
}

impl Config {
    /// Default config location: `<config_dir>/kemono/kemono.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kemono").join(CONFIG_FILE_NAME))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a specific path
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, or from the default location if it exists.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::read_or_default(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file without validating it.
    ///
    /// For callers that apply overrides first and then call [`Config::validate`].
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// [`Config::load_or_default`] without validation.
    pub fn read_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::read(path);
        }
        match Self::default_path() {
            Some(default) if default.exists() => Self::read(&default),
            _ => Ok(Self::default()),
        }
    }

    /// Render configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the paging and search units cannot operate with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paging.page_size == 0 {
            return Err(ConfigError::Invalid(
                "paging.page_size must be at least 1".to_string(),
            ));
        }
        if !self.paging.scroll_threshold.is_finite() || self.paging.scroll_threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "paging.scroll_threshold must be a non-negative number, got {}",
                self.paging.scroll_threshold
            )));
        }
        if self.general.log_level.parse::<crate::logging::LogLevel>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "general.log_level is not a known level: {}",
                self.general.log_level
            )));
        }
        Ok(())
    }
}
