//! Error types for repository analysis

use miette::Diagnostic;
use monodep_recovery::{Classify, ErrorKind};
use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop an analysis
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The configuration file could not be read
    #[error("Failed to read configuration {}: {source}", path.display())]
    #[diagnostic(code(monodep::analyzer::config_read))]
    ConfigRead {
        /// Configuration file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::AnalyzerConfig`]
    #[error("Invalid configuration{}: {source}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(monodep::analyzer::config_parse),
        help("Sections are [build], [cache], [registry], [discovery], [health] and [errors]")
    )]
    ConfigParse {
        /// Configuration file, when parsed from disk
        path: Option<PathBuf>,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// A configuration given explicitly does not exist
    #[error("Configuration file not found: {}", path.display())]
    #[diagnostic(
        code(monodep::analyzer::config_missing),
        help("Drop --config to use <root>/monodep.toml or the built-in defaults")
    )]
    ConfigMissing {
        /// The path that was given
        path: PathBuf,
    },

    /// Blocking work panicked or was aborted
    #[error("Background task failed: {message}")]
    #[diagnostic(code(monodep::analyzer::task_failed))]
    TaskFailed {
        /// Join error text
        message: String,
    },

    /// Discovery failed outright
    #[error(transparent)]
    #[diagnostic(transparent)]
    Workspace(#[from] monodep_workspaces::Error),

    /// Tree construction failed outright
    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolver(#[from] monodep_resolver::Error),

    /// The registry client could not be created
    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] monodep_registry::Error),

    /// The cache could not be opened
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] monodep_cache::Error),
}

impl Error {
    /// Whether the analysis stopped because it was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Resolver(monodep_resolver::Error::Cancelled))
    }
}

impl Classify for Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::ConfigRead { .. } => Some(ErrorKind::FileSystem),
            Self::ConfigParse { .. } | Self::ConfigMissing { .. } | Self::TaskFailed { .. } => None,
            Self::Workspace(inner) => inner.error_kind(),
            Self::Resolver(inner) => inner.error_kind(),
            Self::Registry(inner) => inner.error_kind(),
            Self::Cache(inner) => inner.error_kind(),
        }
    }
}

/// Result type for repository analysis
pub type Result<T> = std::result::Result<T, Error>;
