//! Workspace discovery for JavaScript monorepos.
//!
//! Given a repository root, this crate finds every workspace configuration
//! (`pnpm-workspace.yaml`, `lerna.json`, `nx.json`/`workspace.json` and
//! `package.json` workspaces), applies precedence when several describe the
//! same root, and expands their member patterns into [`WorkspacePackage`]s.
//!
//! Discovery is tolerant: malformed manifests and configurations are
//! reported in the [`DiscoveryReport`] and, when a handler is attached,
//! forwarded to the [`monodep_recovery::ErrorHandler`]. Only a missing
//! repository root is a hard error.
//!
//! ```no_run
//! use monodep_workspaces::{DiscoveryOptions, WorkspaceParser};
//! use std::path::Path;
//!
//! let parser = WorkspaceParser::new(DiscoveryOptions::default());
//! let report = parser.discover_packages(Path::new("/path/to/repo"))?;
//! for package in &report.packages {
//!     tracing::info!("{}@{} at {}", package.name, package.version, package.path.display());
//! }
//! # Ok::<(), monodep_workspaces::Error>(())
//! ```

pub mod detection;
pub mod discovery;
pub mod error;
pub mod parser;
pub mod types;

pub use discovery::configs::ConfigurationScan;
pub use discovery::manifest::PackageJson;
pub use discovery::resolve_glob_patterns;
pub use error::{Error, Result};
pub use parser::WorkspaceParser;
pub use types::{
    DEFAULT_IGNORED_DIRS, DiscoveryOptions, DiscoveryReport, PackageKind, SkippedFile,
    WorkspaceConfiguration, WorkspaceKind, WorkspacePackage,
};
