//! Error types for package graph operations.

use miette::Diagnostic;
use monodep_recovery::{Classify, ErrorKind};
use thiserror::Error;

/// Result type for package graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building or ordering a package graph.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum Error {
    /// An edge names a package that was never added.
    #[error("Package '{from}' depends on unknown package '{to}'")]
    #[diagnostic(
        code(monodep::cycles::unknown_package),
        help("Add both packages to the graph before connecting them")
    )]
    UnknownPackage {
        /// Source of the edge.
        from: String,
        /// Missing target.
        to: String,
    },

    /// Ordering was requested for a graph with cycles.
    #[error("Package graph contains {count} cycle(s)")]
    #[diagnostic(
        code(monodep::cycles::cycle_detected),
        help("Run `monodep cycles` to list the cycles and suggested break points")
    )]
    CycleDetected {
        /// Number of cycles found.
        count: usize,
    },
}

impl Classify for Error {
    fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::UnknownPackage { .. } => Some(ErrorKind::DependencyTree),
            Self::CycleDetected { .. } => Some(ErrorKind::CircularDependency),
        }
    }
}
