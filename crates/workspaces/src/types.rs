//! Workspace configurations, packages and discovery results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// The workspace convention a configuration file follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceKind {
    /// `pnpm-workspace.yaml`
    Pnpm,
    /// `lerna.json`
    Lerna,
    /// `nx.json` or `workspace.json`
    Nx,
    /// `package.json` workspaces managed by Yarn
    Yarn,
    /// `package.json` workspaces managed by npm
    Npm,
}

impl WorkspaceKind {
    /// Precedence when several configurations describe the same root.
    ///
    /// Lower numbers win.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Pnpm => 1,
            Self::Lerna => 2,
            Self::Nx => 3,
            Self::Yarn => 4,
            Self::Npm => 5,
        }
    }

    /// The client used when nothing else identifies one.
    #[must_use]
    pub const fn default_package_manager(self) -> &'static str {
        match self {
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Lerna | Self::Nx | Self::Npm => "npm",
        }
    }
}

impl fmt::Display for WorkspaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pnpm => "pnpm",
            Self::Lerna => "lerna",
            Self::Nx => "nx",
            Self::Yarn => "yarn",
            Self::Npm => "npm",
        };
        f.write_str(label)
    }
}

/// A workspace configuration found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfiguration {
    /// Convention followed by the configuration file.
    pub kind: WorkspaceKind,
    /// Directory the member patterns are relative to.
    pub root_path: PathBuf,
    /// The configuration file itself.
    pub config_path: PathBuf,
    /// Member glob patterns, `!`-prefixed entries exclude.
    pub packages: Vec<String>,
    /// Package manager client (`npm`, `yarn`, `pnpm`, `bun`).
    pub package_manager: String,
    /// See [`WorkspaceKind::priority`].
    pub priority: u8,
}

/// Whether a package is meant to be consumed by other packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// Published or consumed as a dependency.
    #[default]
    Library,
    /// A deployable leaf such as a web app or a service.
    Application,
}

/// A package declared by a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspacePackage {
    /// Package name from the manifest.
    pub name: String,
    /// Declared version; `0.0.0` when the manifest has none.
    pub version: String,
    /// Directory containing the manifest.
    pub path: PathBuf,
    /// The `package.json` itself.
    pub manifest_path: PathBuf,
    /// `dependencies`
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// `devDependencies`
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    /// `peerDependencies`
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
    /// `private` flag.
    #[serde(default)]
    pub private: bool,
    /// Library or application.
    #[serde(default)]
    pub kind: PackageKind,
    /// Root of the configuration that declared this package.
    pub workspace_root: PathBuf,
}

impl WorkspacePackage {
    /// Every declared dependency name with its range, regular ones first.
    pub fn declared_ranges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dependencies
            .iter()
            .chain(&self.dev_dependencies)
            .chain(&self.peer_dependencies)
            .map(|(name, range)| (name.as_str(), range.as_str()))
    }
}

/// Options controlling filesystem traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    /// Directory names never descended into.
    pub ignored_dirs: Vec<String>,
    /// Descend into symlinked directories.
    pub follow_links: bool,
}

/// Directories pruned from every traversal unless overridden.
pub const DEFAULT_IGNORED_DIRS: [&str; 10] = [
    "node_modules",
    ".git",
    "dist",
    "build",
    "target",
    "coverage",
    ".next",
    ".turbo",
    ".cache",
    "out",
];

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(ToString::to_string).collect(),
            follow_links: false,
        }
    }
}

impl DiscoveryOptions {
    /// Whether a directory with this name is pruned.
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_dirs.iter().any(|ignored| ignored == name)
    }
}

/// A file that discovery could not use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    /// The offending file.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of package discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// Configurations in effect after precedence was applied.
    pub configurations: Vec<WorkspaceConfiguration>,
    /// Unique packages, in configuration order.
    pub packages: Vec<WorkspacePackage>,
    /// Manifests that were found but could not be used.
    pub skipped_manifests: Vec<SkippedFile>,
    /// Configuration files that could not be parsed.
    pub skipped_configurations: Vec<SkippedFile>,
}

impl DiscoveryReport {
    /// Look a package up by name.
    #[must_use]
    pub fn package(&self, name: &str) -> Option<&WorkspacePackage> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Whether anything was skipped.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.skipped_manifests.is_empty() && self.skipped_configurations.is_empty()
    }
}
