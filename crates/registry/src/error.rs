//! Error types for registry lookups

use miette::Diagnostic;
use monodep_recovery::{Classify, ErrorKind};
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`crate::ExternalResolver`] implementations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The registry has no package with this name
    #[error("Package '{name}' was not found in the registry")]
    #[diagnostic(
        code(monodep::registry::package_not_found),
        help("Check the package name for typos and that the registry hosts it")
    )]
    PackageNotFound {
        /// Requested package name
        name: String,
    },

    /// The package exists but no version matches the range
    #[error("No version of '{name}' matches '{range}'")]
    #[diagnostic(
        code(monodep::registry::version_not_found),
        help("Widen the range or publish a matching version")
    )]
    VersionNotFound {
        /// Requested package name
        name: String,
        /// Requested range or exact version
        range: String,
    },

    /// The registry could not be reached
    #[error("Network error while fetching '{name}': {message}")]
    #[diagnostic(
        code(monodep::registry::network),
        help("Check connectivity and the configured registry URL")
    )]
    Network {
        /// Package being fetched
        name: String,
        /// Transport error message
        message: String,
    },

    /// The registry answered with an unexpected status
    #[error("Registry returned HTTP {status} for '{name}'")]
    #[diagnostic(code(monodep::registry::http_status))]
    HttpStatus {
        /// Package being fetched
        name: String,
        /// HTTP status code
        status: u16,
    },

    /// The request did not complete in time
    #[error("Request for '{name}' timed out after {after_ms} ms")]
    #[diagnostic(
        code(monodep::registry::timeout),
        help("Increase the registry timeout or retry later")
    )]
    Timeout {
        /// Package being fetched
        name: String,
        /// Elapsed time in milliseconds
        after_ms: u64,
    },

    /// The registry document could not be decoded
    #[error("Invalid registry document for '{name}': {message}")]
    #[diagnostic(code(monodep::registry::invalid_document))]
    InvalidDocument {
        /// Package being fetched
        name: String,
        /// Decoder message
        message: String,
    },

    /// The HTTP client could not be built
    #[error("Failed to create registry client: {message}")]
    #[diagnostic(code(monodep::registry::client))]
    Client {
        /// Builder error message
        message: String,
    },

    /// A fixture file could not be read
    #[error("Failed to read registry fixture {}", path.display())]
    #[diagnostic(code(monodep::registry::fixture))]
    Fixture {
        /// Fixture path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The requested range is not a semantic version range
    #[error(transparent)]
    #[diagnostic(transparent)]
    Version(#[from] monodep_versions::Error),
}

impl Error {
    /// Create a not-found error for a package
    #[must_use]
    pub fn package_not_found(name: impl Into<String>) -> Self {
        Self::PackageNotFound { name: name.into() }
    }

    /// Create a not-found error for a version range
    #[must_use]
    pub fn version_not_found(name: impl Into<String>, range: impl Into<String>) -> Self {
        Self::VersionNotFound {
            name: name.into(),
            range: range.into(),
        }
    }

    /// Create a network error
    #[must_use]
    pub fn network(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(name: impl Into<String>, after: std::time::Duration) -> Self {
        Self::Timeout {
            name: name.into(),
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether the error means the package or version does not exist
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::PackageNotFound { .. } | Self::VersionNotFound { .. }
        )
    }
}

impl Classify for Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        Some(match self {
            Self::PackageNotFound { .. } | Self::VersionNotFound { .. } => {
                ErrorKind::DependencyTree
            }
            Self::Network { .. } | Self::HttpStatus { .. } | Self::Client { .. } => {
                ErrorKind::Network
            }
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidDocument { .. } => ErrorKind::JsonParse,
            Self::Fixture { .. } => ErrorKind::FileSystem,
            Self::Version(_) => ErrorKind::VersionRange,
        })
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;
