//! The fixed error taxonomy and its static definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Every kind of failure monodep knows how to talk about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Reading or walking the filesystem failed.
    FileSystem,
    /// A JSON document could not be parsed.
    JsonParse,
    /// A YAML document could not be parsed.
    YamlParse,
    /// Workspace configurations disagree about the same root.
    WorkspaceConfigConflict,
    /// A version or range could not be parsed or matched.
    VersionRange,
    /// Building the dependency tree failed.
    DependencyTree,
    /// A registry request failed.
    Network,
    /// An operation exceeded its time budget.
    Timeout,
    /// The process ran out of memory headroom.
    MemoryLimit,
    /// A cached entry could not be decoded.
    CacheCorruption,
    /// A circular dependency was found.
    CircularDependency,
    /// A version conflict could not be resolved.
    ConflictResolution,
    /// Anything that did not match another kind.
    Unknown,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::FileSystem,
        Self::JsonParse,
        Self::YamlParse,
        Self::WorkspaceConfigConflict,
        Self::VersionRange,
        Self::DependencyTree,
        Self::Network,
        Self::Timeout,
        Self::MemoryLimit,
        Self::CacheCorruption,
        Self::CircularDependency,
        Self::ConflictResolution,
        Self::Unknown,
    ];

    /// Stable identifier used in logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FileSystem => "file_system",
            Self::JsonParse => "json_parse",
            Self::YamlParse => "yaml_parse",
            Self::WorkspaceConfigConflict => "workspace_config_conflict",
            Self::VersionRange => "version_range",
            Self::DependencyTree => "dependency_tree",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::MemoryLimit => "memory_limit",
            Self::CacheCorruption => "cache_corruption",
            Self::CircularDependency => "circular_dependency",
            Self::ConflictResolution => "conflict_resolution",
            Self::Unknown => "unknown",
        }
    }

    /// The static definition for this kind.
    #[must_use]
    pub fn definition(self) -> &'static ErrorDefinition {
        DEFINITIONS
            .iter()
            .find(|d| d.kind == self)
            .unwrap_or(&DEFINITIONS[DEFINITIONS.len() - 1])
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad an error is for the analysis as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic or easily absorbed.
    Low,
    /// Loses some detail from the result.
    Medium,
    /// Loses a significant part of the result.
    High,
    /// The analysis cannot continue meaningfully.
    Critical,
}

/// Static facts about an [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorDefinition {
    /// The kind described.
    pub kind: ErrorKind,
    /// Default severity.
    pub severity: Severity,
    /// Whether a recovery strategy may be attempted.
    pub recoverable: bool,
    /// Message suitable for end users.
    pub user_message: &'static str,
    /// Typical causes, for diagnostics output.
    pub common_causes: &'static [&'static str],
    /// Typical fixes, for diagnostics output.
    pub solutions: &'static [&'static str],
}

static DEFINITIONS: [ErrorDefinition; 13] = [
    ErrorDefinition {
        kind: ErrorKind::FileSystem,
        severity: Severity::High,
        recoverable: true,
        user_message: "A file or directory could not be read",
        common_causes: &[
            "The path was removed while the analysis was running",
            "Insufficient permissions",
            "Broken symbolic link",
        ],
        solutions: &[
            "Check that the repository is fully checked out",
            "Verify read permissions on the repository",
        ],
    },
    ErrorDefinition {
        kind: ErrorKind::JsonParse,
        severity: Severity::Medium,
        recoverable: true,
        user_message: "A JSON manifest could not be parsed",
        common_causes: &["Trailing commas or comments in package.json", "Merge conflict markers"],
        solutions: &["Validate the file with a JSON linter", "Resolve pending merge conflicts"],
    },
    ErrorDefinition {
        kind: ErrorKind::YamlParse,
        severity: Severity::Medium,
        recoverable: true,
        user_message: "A YAML configuration could not be parsed",
        common_causes: &["Inconsistent indentation", "Tabs used for indentation"],
        solutions: &["Validate the file with a YAML linter"],
    },
    ErrorDefinition {
        kind: ErrorKind::WorkspaceConfigConflict,
        severity: Severity::Medium,
        recoverable: true,
        user_message: "Several workspace configurations describe the same root",
        common_causes: &[
            "Migrating between package managers left old configuration behind",
            "Both pnpm-workspace.yaml and package.json workspaces are present",
        ],
        solutions: &["Remove the configuration of the package manager no longer in use"],
    },
    ErrorDefinition {
        kind: ErrorKind::VersionRange,
        severity: Severity::Low,
        recoverable: true,
        user_message: "A version or version range could not be interpreted",
        common_causes: &[
            "Dist-tags, git URLs or file: protocols used as ranges",
            "Compound ranges such as '>=1 <2' or '1.x'",
        ],
        solutions: &["Pin the dependency to a plain semantic version range"],
    },
    ErrorDefinition {
        kind: ErrorKind::DependencyTree,
        severity: Severity::High,
        recoverable: true,
        user_message: "Part of the dependency tree could not be built",
        common_causes: &["A dependency is missing from the registry", "Depth limit reached"],
        solutions: &["Check the package names and ranges", "Raise the maximum depth"],
    },
    ErrorDefinition {
        kind: ErrorKind::Network,
        severity: Severity::Medium,
        recoverable: true,
        user_message: "The package registry could not be reached",
        common_causes: &["No network connectivity", "Registry outage", "Proxy misconfiguration"],
        solutions: &["Retry later", "Configure a registry mirror"],
    },
    ErrorDefinition {
        kind: ErrorKind::Timeout,
        severity: Severity::Medium,
        recoverable: true,
        user_message: "An operation took too long",
        common_causes: &["Slow registry responses", "Very large dependency graphs"],
        solutions: &["Increase the per-package timeout", "Lower the concurrency level"],
    },
    ErrorDefinition {
        kind: ErrorKind::MemoryLimit,
        severity: Severity::Critical,
        recoverable: false,
        user_message: "The analysis ran out of memory",
        common_causes: &["Extremely deep or wide dependency graphs"],
        solutions: &["Lower the maximum depth", "Exclude dev and peer dependencies"],
    },
    ErrorDefinition {
        kind: ErrorKind::CacheCorruption,
        severity: Severity::Low,
        recoverable: true,
        user_message: "A cached resolution could not be read",
        common_causes: &["Interrupted write", "Cache written by an incompatible version"],
        solutions: &["Clear the cache directory"],
    },
    ErrorDefinition {
        kind: ErrorKind::CircularDependency,
        severity: Severity::Medium,
        recoverable: false,
        user_message: "Packages depend on each other in a cycle",
        common_causes: &["Shared code placed in an application package"],
        solutions: &["Extract the shared code into a new library package"],
    },
    ErrorDefinition {
        kind: ErrorKind::ConflictResolution,
        severity: Severity::Medium,
        recoverable: true,
        user_message: "A version conflict could not be resolved automatically",
        common_causes: &["Ranges with no common version"],
        solutions: &["Align the ranges manually", "Upgrade the lagging packages"],
    },
    ErrorDefinition {
        kind: ErrorKind::Unknown,
        severity: Severity::High,
        recoverable: false,
        user_message: "An unexpected error occurred",
        common_causes: &[],
        solutions: &["Re-run with RUST_LOG=debug and report the output"],
    },
];
