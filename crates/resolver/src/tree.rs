//! The result of a tree build.

use crate::conflicts::EnhancedConflict;
use crate::node::{PackageNode, ResolutionSource};
use chrono::{DateTime, Utc};
use monodep_recovery::ErrorKind;
use monodep_versions::SemanticVersion;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One `name@version` in the flattened index.
///
/// Records what the tree says about the package without owning any node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    /// Package name.
    pub name: String,
    /// Concrete version.
    pub version: String,
    /// Parsed version, if valid.
    pub resolved_version: Option<SemanticVersion>,
    /// Every range that led to this version.
    pub requested_ranges: BTreeSet<String>,
    /// Names of the packages depending on it.
    pub dependents: BTreeSet<String>,
    /// Whether the package belongs to the repository.
    pub is_workspace: bool,
    /// Source of the first occurrence.
    pub resolution_source: ResolutionSource,
    /// Shallowest depth it appears at.
    pub min_depth: usize,
    /// Number of nodes with this identity.
    pub occurrences: usize,
}

/// A dependency that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    /// Package that failed.
    pub package: String,
    /// Range that was requested.
    pub requested_range: String,
    /// Package that declared it, absent for roots.
    pub parent: Option<String>,
    /// Depth the node would have had.
    pub depth: usize,
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// Failure message.
    pub message: String,
}

/// Counters describing a build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeMetadata {
    /// Nodes in all root subtrees.
    pub total_nodes: usize,
    /// Entries in the flattened index.
    pub unique_packages: usize,
    /// Nodes not belonging to the repository.
    pub external_packages: usize,
    /// Nodes belonging to the repository.
    pub workspace_packages: usize,
    /// Deepest node depth.
    pub max_depth: usize,
    /// Conflicts detected.
    pub conflict_count: usize,
    /// Conflicts with an applied resolution.
    pub auto_resolved_conflicts: usize,
    /// Node cache hit rate, 0 to 1.
    pub cache_hit_rate: f64,
    /// Share of node cache hits served by the hot tier, 0 to 1.
    pub hot_cache_hit_rate: f64,
    /// Dependencies left out because they failed to resolve.
    pub unresolved_subtrees: usize,
    /// Dependencies left out because they were too deep.
    pub truncated_subtrees: usize,
    /// Roots none of whose dependencies resolved.
    pub failed_roots: usize,
    /// Errors for which a recovery strategy ran.
    pub recovery_actions: usize,
    /// Whether the whole tree came from the tree cache.
    pub from_cache: bool,
    /// Digest of the package set the tree was built from.
    pub input_hash: String,
    /// Wall time of the build in milliseconds.
    pub duration_ms: u64,
    /// When the build finished.
    pub built_at: DateTime<Utc>,
}

/// A resolved dependency tree with its conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyTree {
    /// One node per resolved root package.
    pub root_packages: Vec<PackageNode>,
    /// Flattened index keyed by `name@version`.
    pub all_packages: BTreeMap<String, PackageEntry>,
    /// Version conflicts with resolution options.
    pub conflicts: Vec<EnhancedConflict>,
    /// Dependencies that were left out, most recent build only.
    #[serde(default)]
    pub failures: Vec<ResolutionFailure>,
    /// Build counters.
    pub metadata: TreeMetadata,
}

impl DependencyTree {
    /// The root node for a package name.
    #[must_use]
    pub fn root(&self, name: &str) -> Option<&PackageNode> {
        self.root_packages.iter().find(|n| n.name == name)
    }

    /// Every index entry for a package name.
    pub fn versions_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PackageEntry> + 'a {
        self.all_packages.values().filter(move |e| e.name == name)
    }

    /// Whether nothing was left out.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.metadata.unresolved_subtrees == 0 && self.metadata.failed_roots == 0
    }
}

/// Index every node under `roots` by `name@version`.
#[must_use]
pub fn flatten(roots: &[PackageNode]) -> BTreeMap<String, PackageEntry> {
    let mut index: BTreeMap<String, PackageEntry> = BTreeMap::new();
    for root in roots {
        root.visit(None, &mut |node, parent| {
            let entry = index.entry(node.id()).or_insert_with(|| PackageEntry {
                name: node.name.clone(),
                version: node.version.clone(),
                resolved_version: node.resolved_version.clone(),
                requested_ranges: BTreeSet::new(),
                dependents: BTreeSet::new(),
                is_workspace: node.is_workspace,
                resolution_source: node.resolution_source,
                min_depth: node.depth,
                occurrences: 0,
            });
            entry.occurrences += 1;
            entry.min_depth = entry.min_depth.min(node.depth);
            if !node.requested_range.is_empty() {
                entry.requested_ranges.insert(node.requested_range.clone());
            }
            if let Some(parent) = parent {
                entry.dependents.insert(parent.name.clone());
            }
        });
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_merges_identical_versions() {
        let mut web = PackageNode::leaf("web", "1.0.0", "1.0.0", 0, ResolutionSource::Workspace);
        web.dependencies.insert(
            "react".into(),
            PackageNode::leaf("react", "18.2.0", "^18.0.0", 1, ResolutionSource::Registry),
        );
        let mut docs = PackageNode::leaf("docs", "1.0.0", "1.0.0", 0, ResolutionSource::Workspace);
        docs.dependencies.insert(
            "react".into(),
            PackageNode::leaf("react", "18.2.0", "^18.2.0", 1, ResolutionSource::Registry),
        );

        let index = flatten(&[web, docs]);
        assert_eq!(index.len(), 3);
        let react = &index["react@18.2.0"];
        assert_eq!(react.occurrences, 2);
        assert_eq!(react.requested_ranges.len(), 2);
        assert_eq!(
            react.dependents.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["docs", "web"]
        );
        assert!(index["web@1.0.0"].dependents.is_empty());
    }
}
