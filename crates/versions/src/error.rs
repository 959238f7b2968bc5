//! Error types for version parsing and range evaluation.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for version operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing versions and ranges.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum Error {
    /// The input does not match `major.minor.patch[-prerelease][+build]`.
    #[error("Invalid version format: '{input}'")]
    #[diagnostic(
        code(monodep::versions::invalid_version_format),
        help("Versions must look like 1.2.3, 1.2.3-beta.1 or 1.2.3+build.5 (a leading 'v' is allowed)")
    )]
    InvalidVersionFormat {
        /// The rejected input.
        input: String,
    },

    /// The input is not a single-operator version range.
    #[error("Invalid version range '{input}': {reason}")]
    #[diagnostic(
        code(monodep::versions::invalid_range),
        help("Supported ranges are a version optionally prefixed by one of ^ ~ >= <= > < =")
    )]
    InvalidRange {
        /// The rejected input.
        input: String,
        /// Why the range was rejected.
        reason: String,
    },
}

impl Error {
    /// Create an invalid version error.
    #[must_use]
    pub fn invalid_version(input: impl Into<String>) -> Self {
        Self::InvalidVersionFormat {
            input: input.into(),
        }
    }

    /// Create an invalid range error.
    #[must_use]
    pub fn invalid_range(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            input: input.into(),
            reason: reason.into(),
        }
    }
}
