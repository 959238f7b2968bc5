//! Resolved packages and their subtrees.

use monodep_versions::SemanticVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where a node's version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionSource {
    /// A package of the repository itself.
    Workspace,
    /// Looked up through the external resolver.
    Registry,
    /// Served by the resolution cache.
    Cache,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Workspace => "workspace",
            Self::Registry => "registry",
            Self::Cache => "cache",
        })
    }
}

/// Which manifest section declared a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// `dependencies`
    Runtime,
    /// `devDependencies`
    Dev,
    /// `peerDependencies`
    Peer,
}

type Children = BTreeMap<String, PackageNode>;

/// One resolved package and the subtree it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageNode {
    /// Package name.
    pub name: String,
    /// Concrete version in use.
    pub version: String,
    /// Range the parent asked for; the manifest version for roots.
    pub requested_range: String,
    /// `version` parsed, when it is a valid semantic version.
    pub resolved_version: Option<SemanticVersion>,
    /// Runtime children by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: Children,
    /// Development children by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: Children,
    /// Peer children by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peer_dependencies: Children,
    /// Distance from the root; roots are 0.
    pub depth: usize,
    /// Whether the package belongs to the repository.
    pub is_workspace: bool,
    /// How the version was obtained.
    pub resolution_source: ResolutionSource,
}

impl PackageNode {
    /// A node without children.
    #[must_use]
    pub fn leaf(
        name: impl Into<String>,
        version: impl Into<String>,
        requested_range: impl Into<String>,
        depth: usize,
        source: ResolutionSource,
    ) -> Self {
        let version = version.into();
        Self {
            name: name.into(),
            resolved_version: SemanticVersion::parse(&version).ok(),
            version,
            requested_range: requested_range.into(),
            dependencies: Children::new(),
            dev_dependencies: Children::new(),
            peer_dependencies: Children::new(),
            depth,
            is_workspace: source == ResolutionSource::Workspace,
            resolution_source: source,
        }
    }

    /// `name@version`, the key of the flattened index.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// The children map for one dependency kind.
    #[must_use]
    pub const fn children_of(&self, kind: DependencyKind) -> &Children {
        match kind {
            DependencyKind::Runtime => &self.dependencies,
            DependencyKind::Dev => &self.dev_dependencies,
            DependencyKind::Peer => &self.peer_dependencies,
        }
    }

    /// Mutable access to the children map for one dependency kind.
    pub fn children_of_mut(&mut self, kind: DependencyKind) -> &mut Children {
        match kind {
            DependencyKind::Runtime => &mut self.dependencies,
            DependencyKind::Dev => &mut self.dev_dependencies,
            DependencyKind::Peer => &mut self.peer_dependencies,
        }
    }

    /// Every direct child with the kind that declared it.
    pub fn children(&self) -> impl Iterator<Item = (DependencyKind, &Self)> {
        let runtime = self.dependencies.values().map(|n| (DependencyKind::Runtime, n));
        let dev = self.dev_dependencies.values().map(|n| (DependencyKind::Dev, n));
        let peer = self.peer_dependencies.values().map(|n| (DependencyKind::Peer, n));
        runtime.chain(dev).chain(peer)
    }

    /// Visit the subtree depth-first, parents before children.
    pub fn visit<'a>(&'a self, parent: Option<&'a Self>, f: &mut impl FnMut(&'a Self, Option<&'a Self>)) {
        f(self, parent);
        for (_, child) in self.children() {
            child.visit(Some(self), f);
        }
    }

    /// Nodes in the subtree, this one included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.children().map(|(_, c)| c.node_count()).sum::<usize>()
    }

    /// Greatest depth found in the subtree.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.children()
            .map(|(_, c)| c.max_depth())
            .max()
            .unwrap_or(self.depth)
            .max(self.depth)
    }

    /// Move the subtree to start at `depth`, mark it as served from
    /// `source`, and drop children that would sit deeper than `max_depth`.
    ///
    /// Returns the number of subtrees dropped.
    pub fn rebase(&mut self, depth: usize, max_depth: usize, source: ResolutionSource) -> usize {
        self.depth = depth;
        if !self.is_workspace {
            self.resolution_source = source;
        }
        let mut truncated = 0;
        for kind in [DependencyKind::Runtime, DependencyKind::Dev, DependencyKind::Peer] {
            let children = self.children_of_mut(kind);
            if depth + 1 > max_depth {
                truncated += children.len();
                children.clear();
            } else {
                for child in children.values_mut() {
                    truncated += child.rebase(depth + 1, max_depth, source);
                }
            }
        }
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(length: usize) -> PackageNode {
        let mut node = PackageNode::leaf(format!("n{length}"), "1.0.0", "^1.0.0", length, ResolutionSource::Registry);
        for depth in (0..length).rev() {
            let mut parent =
                PackageNode::leaf(format!("n{depth}"), "1.0.0", "^1.0.0", depth, ResolutionSource::Registry);
            parent.dependencies.insert(node.name.clone(), node);
            node = parent;
        }
        node
    }

    #[test]
    fn test_counts_and_depth() {
        let root = chain(4);
        assert_eq!(root.node_count(), 5);
        assert_eq!(root.max_depth(), 4);
        assert_eq!(root.id(), "n0@1.0.0");
    }

    #[test]
    fn test_rebase_truncates_deep_children() {
        let mut root = chain(4);
        let truncated = root.rebase(2, 3, ResolutionSource::Cache);
        assert_eq!(truncated, 1);
        assert_eq!(root.depth, 2);
        assert_eq!(root.max_depth(), 3);
        assert_eq!(root.node_count(), 2);
        assert_eq!(root.resolution_source, ResolutionSource::Cache);
    }

    #[test]
    fn test_unparsable_version_has_no_resolved_version() {
        let node = PackageNode::leaf("ui", "workspace", "*", 0, ResolutionSource::Workspace);
        assert!(node.resolved_version.is_none());
        assert!(node.is_workspace);
    }
}
