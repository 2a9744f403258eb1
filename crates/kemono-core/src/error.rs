//! Error types for kemono-core

use std::fmt::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remediation command for resolving an error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a suggested command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for kemono-core
#[derive(Error, Debug)]
pub enum Error {
    /// Search collaborator failures
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Catalog loading errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Runtime errors (missing executor, closed channels, disposed units)
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Search(err) => Some(err.remediation()),
            Self::Config(err) => Some(err.remediation()),
            Self::Catalog(err) => Some(err.remediation()),
            Self::Io(_) => Some(
                Remediation::new("Check file permissions and paths, then retry.")
                    .alternative("Verify the catalog and config paths exist and are readable."),
            ),
            Self::Json(_) => Some(
                Remediation::new("Validate the JSON input and retry.")
                    .command("Validate JSON", "python -m json.tool < servers.json"),
            ),
            Self::Runtime(_) => None,
        }
    }
}

/// Failure reported by the search execution collaborator.
///
/// The message is surfaced to the consumer verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum SearchError {
    /// The collaborator rejected or failed the query
    #[error("{0}")]
    Failed(String),
}

impl SearchError {
    /// Shorthand for [`SearchError::Failed`].
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// The collaborator's message.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Failed(message) => message,
        }
    }

    #[must_use]
    pub fn remediation(&self) -> Remediation {
        Remediation::new("Retry the same query once the search backend is reachable.")
            .alternative("Clear the search field to return to the browse list.")
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered back to TOML
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Config parsed but holds out-of-range values
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Read { .. } => Remediation::new("Check that the config path exists and is readable.")
                .command("Show defaults", "kemono config --default")
                .alternative("Omit --config to fall back to built-in defaults."),
            Self::Parse(_) | Self::Serialize(_) => {
                Remediation::new("Fix the TOML syntax in the config file.")
                    .command("Show defaults", "kemono config --default")
            }
            Self::Invalid(_) => Remediation::new("Correct the out-of-range config value.")
                .alternative("page_size must be at least 1 and scroll_threshold a non-negative number."),
        }
    }
}

/// Catalog loading errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Catalog file could not be read
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catalog file is not a JSON array of servers
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two entries share the same id
    #[error("duplicate server id in catalog: {0}")]
    DuplicateId(String),
}

impl CatalogError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Read { .. } => Remediation::new("Check that the catalog path exists and is readable."),
            Self::Parse(_) => Remediation::new(
                "The catalog must be a JSON array of objects with \"id\" and \"name\" fields.",
            )
            .command("Validate JSON", "python -m json.tool < servers.json"),
            Self::DuplicateId(_) => {
                Remediation::new("Remove or rename the duplicated server entry.")
            }
        }
    }
}
