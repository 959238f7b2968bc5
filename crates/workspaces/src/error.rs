//! Error types for workspace discovery.

use miette::Diagnostic;
use monodep_recovery::{Classify, ErrorKind};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for workspace operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while discovering workspaces and packages.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Repository root directory not found.
    #[error("Workspace root not found at path: {path}")]
    #[diagnostic(
        code(monodep::workspaces::workspace_not_found),
        help("Ensure the path points to an existing directory containing a package.json")
    )]
    WorkspaceNotFound {
        /// The path that was searched.
        path: PathBuf,
    },

    /// Invalid workspace configuration.
    #[error("Invalid workspace configuration at {path}: {message}")]
    #[diagnostic(
        code(monodep::workspaces::invalid_config),
        help(
            "Check the workspace configuration file for syntax errors or missing required fields"
        )
    )]
    InvalidWorkspaceConfig {
        /// Path to the invalid configuration file.
        path: PathBuf,
        /// Description of what is invalid.
        message: String,
    },

    /// Several configurations describe the same root; only one is used.
    #[error("{ignored} is superseded by {kept} for workspace root {}", root.display())]
    #[diagnostic(
        code(monodep::workspaces::conflicting_configurations),
        help("Remove the configuration of the package manager no longer in use")
    )]
    ConflictingConfigurations {
        /// The shared root.
        root: PathBuf,
        /// Configuration in effect.
        kept: String,
        /// Configuration that was ignored.
        ignored: String,
    },

    /// A package manifest lacks a usable `name`.
    #[error("Package manifest at {path} has no name")]
    #[diagnostic(
        code(monodep::workspaces::unnamed_package),
        help("Add a \"name\" field to the package.json")
    )]
    UnnamedPackage {
        /// Path to the manifest.
        path: PathBuf,
    },

    /// A glob pattern in a workspace configuration is malformed.
    #[error("Invalid workspace pattern '{pattern}': {message}")]
    #[diagnostic(
        code(monodep::workspaces::invalid_pattern),
        help("Workspace patterns support '*', '**' and a leading '!' for exclusions")
    )]
    InvalidPattern {
        /// The pattern as written.
        pattern: String,
        /// Parser message.
        message: String,
    },

    /// I/O error occurred.
    #[error("I/O error during {operation}{}: {source}", path.as_ref().map(|p| format!(" at {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(monodep::workspaces::io_error),
        help("Check that the referenced paths exist and that you have permission to read them")
    )]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Optional path where the error occurred.
        path: Option<PathBuf>,
        /// Description of the operation being performed.
        operation: String,
    },

    /// JSON parsing error.
    #[error("JSON parsing error{}: {source}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(monodep::workspaces::json_error),
        help("Ensure the JSON has valid syntax: no trailing commas, comments or merge markers")
    )]
    Json {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
        /// Optional path to the file being parsed.
        path: Option<PathBuf>,
    },

    /// YAML parsing error.
    #[error("YAML parsing error{}: {source}", path.as_ref().map(|p| format!(" in {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(monodep::workspaces::yaml_error),
        help("Ensure the YAML has valid syntax and consistent indentation")
    )]
    Yaml {
        /// The underlying YAML error.
        #[source]
        source: serde_yaml::Error,
        /// Optional path to the file being parsed.
        path: Option<PathBuf>,
    },
}

impl Error {
    /// The file this error is about, when known.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::WorkspaceNotFound { path }
            | Self::InvalidWorkspaceConfig { path, .. }
            | Self::UnnamedPackage { path }
            | Self::ConflictingConfigurations { root: path, .. } => Some(path),
            Self::Io { path, .. } | Self::Json { path, .. } | Self::Yaml { path, .. } => {
                path.as_deref()
            }
            Self::InvalidPattern { .. } => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            path: None,
            operation: "file operation".to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Json { source, path: None }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(source: serde_yaml::Error) -> Self {
        Self::Yaml { source, path: None }
    }
}

impl Classify for Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        Some(match self {
            Self::WorkspaceNotFound { .. } | Self::Io { .. } => ErrorKind::FileSystem,
            Self::InvalidWorkspaceConfig { .. }
            | Self::InvalidPattern { .. }
            | Self::ConflictingConfigurations { .. } => ErrorKind::WorkspaceConfigConflict,
            Self::UnnamedPackage { .. } | Self::Json { .. } => ErrorKind::JsonParse,
            Self::Yaml { .. } => ErrorKind::YamlParse,
        })
    }
}
