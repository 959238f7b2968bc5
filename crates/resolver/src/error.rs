//! Error types for dependency tree construction

use miette::Diagnostic;
use monodep_recovery::{Classify, ErrorKind};
use thiserror::Error;

/// Failures that abort a tree build
///
/// Everything else degrades into counts and
/// [`crate::ResolutionFailure`] records on the tree.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// No root package could be resolved
    #[error("All {count} root packages failed to resolve: {}", .reasons.join("; "))]
    #[diagnostic(
        code(monodep::resolver::all_roots_failed),
        help("Check registry connectivity and the package names in the manifests")
    )]
    AllRootsFailed {
        /// Number of roots attempted
        count: usize,
        /// A sample of failure messages
        reasons: Vec<String>,
    },

    /// The build was cancelled
    #[error("Dependency tree build was cancelled")]
    #[diagnostic(code(monodep::resolver::cancelled))]
    Cancelled,

    /// A cache key could not be computed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] monodep_cache::Error),
}

impl Classify for Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::AllRootsFailed { .. } => Some(ErrorKind::DependencyTree),
            Self::Cancelled => None,
            Self::Cache(inner) => inner.error_kind(),
        }
    }
}

/// Result type for tree construction
pub type Result<T> = std::result::Result<T, Error>;
