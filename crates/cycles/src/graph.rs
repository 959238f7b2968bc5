//! Package-level dependency graph using petgraph.
//!
//! Nodes are workspace packages; an edge `a -> b` means `a` depends on `b`.
//! External packages never appear, so every cycle found here is a cycle
//! between packages of the repository.

use crate::{Error, Result};
use monodep_workspaces::{PackageKind, WorkspacePackage};
use petgraph::Direction;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::IntoNodeReferences;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// A package in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    /// Package name.
    pub name: String,
    /// Library or application.
    pub kind: PackageKind,
}

/// Directed graph of workspace packages.
#[derive(Debug, Clone, Default)]
pub struct PackageGraph {
    graph: DiGraph<GraphNode, ()>,
    name_to_node: HashMap<String, NodeIndex>,
}

impl PackageGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph of `packages`.
    ///
    /// Runtime and peer dependencies become edges when they name another
    /// package of the set; development dependencies only when
    /// `include_dev` is set.
    #[must_use]
    pub fn from_packages(packages: &[WorkspacePackage], include_dev: bool) -> Self {
        let mut graph = Self::new();
        for package in packages {
            graph.add_package(&package.name, package.kind);
        }

        let mut edges = 0;
        for package in packages {
            let mut targets: Vec<&String> = package
                .dependencies
                .keys()
                .chain(package.peer_dependencies.keys())
                .collect();
            if include_dev {
                targets.extend(package.dev_dependencies.keys());
            }
            targets.sort();
            targets.dedup();

            for target in targets {
                if let (Some(&from), Some(&to)) = (
                    graph.name_to_node.get(&package.name),
                    graph.name_to_node.get(target),
                ) && graph.graph.find_edge(from, to).is_none()
                {
                    graph.graph.add_edge(from, to, ());
                    edges += 1;
                }
            }
        }

        debug!(
            packages = graph.package_count(),
            edges, "Built package graph"
        );
        graph
    }

    /// Add a package. Adding a name twice returns the existing node.
    pub fn add_package(&mut self, name: &str, kind: PackageKind) -> NodeIndex {
        if let Some(&node) = self.name_to_node.get(name) {
            return node;
        }
        let node = self.graph.add_node(GraphNode {
            name: name.to_string(),
            kind,
        });
        self.name_to_node.insert(name.to_string(), node);
        node
    }

    /// Record that `from` depends on `to`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPackage`] if either package is missing.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<()> {
        let unknown = |missing: &str| Error::UnknownPackage {
            from: from.to_string(),
            to: missing.to_string(),
        };
        let source = *self.name_to_node.get(from).ok_or_else(|| unknown(from))?;
        let target = *self.name_to_node.get(to).ok_or_else(|| unknown(to))?;
        if self.graph.find_edge(source, target).is_none() {
            self.graph.add_edge(source, target, ());
        }
        Ok(())
    }

    /// Number of packages.
    #[must_use]
    pub fn package_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether a package is in the graph.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_node.contains_key(name)
    }

    /// The node for a package name.
    #[must_use]
    pub fn package(&self, name: &str) -> Option<&GraphNode> {
        self.name_to_node
            .get(name)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Whether any cycle exists.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Package names, dependencies before their dependents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] if the graph has a cycle.
    pub fn build_order(&self) -> Result<Vec<String>> {
        let sorted = toposort(&self.graph, None).map_err(|_| Error::CycleDetected {
            count: crate::CircularDetector::default().detect(self).len(),
        })?;
        // toposort puts sources first; sources are the dependents here.
        Ok(sorted
            .into_iter()
            .rev()
            .map(|idx| self.graph[idx].name.clone())
            .collect())
    }

    /// Packages that `name` depends on directly, sorted by name.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Packages depending directly on `name`, sorted by name.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&idx) = self.name_to_node.get(name) else {
            return Vec::new();
        };
        let mut names: Vec<&str> = self
            .graph
            .neighbors_directed(idx, direction)
            .map(|n| self.graph[n].name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Every package, sorted by name.
    pub(crate) fn sorted_nodes(&self) -> Vec<NodeIndex> {
        let mut nodes: Vec<(NodeIndex, &GraphNode)> = self.graph.node_references().collect();
        nodes.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        nodes.into_iter().map(|(idx, _)| idx).collect()
    }

    /// Successors of a node, sorted by name.
    pub(crate) fn sorted_successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut successors: Vec<NodeIndex> = self.graph.neighbors(idx).collect();
        successors.sort_by(|a, b| self.graph[*a].name.cmp(&self.graph[*b].name));
        successors.dedup();
        successors
    }

    pub(crate) fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }
}
