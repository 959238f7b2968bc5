//! Cycle detection and per-cycle remediation reports.

use crate::graph::PackageGraph;
use crate::health::{HealthScoreConfig, health_score};
use monodep_versions::RiskLevel;
use monodep_workspaces::PackageKind;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Rough hours of work per edge of a cycle.
pub const HOURS_PER_EDGE: u32 = 4;

/// An edge that could be removed or inverted to break a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakPoint {
    /// Dependent side of the edge.
    pub from: String,
    /// Dependency side of the edge.
    pub to: String,
    /// How risky cutting this edge is.
    pub risk: RiskLevel,
    /// Why the risk is what it is.
    pub rationale: String,
}

/// Coarse size of the work to remove a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effort {
    /// A day or less.
    Low,
    /// A few days.
    Medium,
    /// Needs planning.
    High,
}

/// Who is touched by a cycle and how long fixing it might take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactReport {
    /// Cycle members and their direct dependents, sorted.
    pub affected_packages: Vec<String>,
    /// Hours, scaled by cycle length.
    pub estimated_hours: u32,
    /// Size class of the work.
    pub effort: Effort,
}

/// One cycle and what to do about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Packages along the cycle; the first package is repeated at the end.
    pub packages: Vec<String>,
    /// Number of edges.
    pub length: usize,
    /// One suggestion per edge, in cycle order.
    pub break_points: Vec<BreakPoint>,
    /// Blast radius.
    pub impact: ImpactReport,
    /// Ordered remediation steps.
    pub steps: Vec<String>,
}

impl CycleReport {
    /// The lowest-risk break point; earlier edges win ties.
    #[must_use]
    pub fn recommended_break_point(&self) -> Option<&BreakPoint> {
        self.break_points
            .iter()
            .enumerate()
            .min_by_key(|(index, bp)| (bp.risk, *index))
            .map(|(_, bp)| bp)
    }

    /// `a -> b -> a`
    #[must_use]
    pub fn path(&self) -> String {
        self.packages.join(" -> ")
    }
}

/// Cycles of a graph with the resulting health score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleAnalysis {
    /// Every cycle found.
    pub cycles: Vec<CycleReport>,
    /// 0 to 100, higher is healthier.
    pub health_score: u8,
    /// Packages in the graph.
    pub total_packages: usize,
    /// Dependencies-first order, when the graph has no cycle.
    pub build_order: Option<Vec<String>>,
}

/// Finds cycles in a [`PackageGraph`].
#[derive(Debug, Clone, Default)]
pub struct CircularDetector {
    health: HealthScoreConfig,
}

struct Frame {
    node: NodeIndex,
    successors: Vec<NodeIndex>,
    next: usize,
}

impl CircularDetector {
    /// A detector scoring health with `health`.
    #[must_use]
    pub const fn new(health: HealthScoreConfig) -> Self {
        Self { health }
    }

    /// Every cycle reachable by depth-first search.
    ///
    /// Each node not yet visited starts a fresh search, so disjoint cycles
    /// are all found in one pass. A node revisited while on the current
    /// path closes a cycle from its position on the path through the
    /// current node. Nodes and successors are visited in name order, so the
    /// result is deterministic.
    #[must_use]
    pub fn detect(&self, graph: &PackageGraph) -> Vec<CycleReport> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut on_path: HashMap<NodeIndex, usize> = HashMap::new();
        let mut path: Vec<NodeIndex> = Vec::new();
        let mut cycles = Vec::new();

        for root in graph.sorted_nodes() {
            if visited.contains(&root) {
                continue;
            }

            let mut stack = vec![Frame {
                node: root,
                successors: graph.sorted_successors(root),
                next: 0,
            }];
            on_path.insert(root, 0);
            path.push(root);

            while let Some(frame) = stack.last_mut() {
                if let Some(&next) = frame.successors.get(frame.next) {
                    frame.next += 1;
                    if let Some(&start) = on_path.get(&next) {
                        let mut members: Vec<NodeIndex> = path[start..].to_vec();
                        members.push(next);
                        cycles.push(Self::report(graph, &members));
                    } else if !visited.contains(&next) {
                        on_path.insert(next, path.len());
                        path.push(next);
                        stack.push(Frame {
                            node: next,
                            successors: graph.sorted_successors(next),
                            next: 0,
                        });
                    }
                } else {
                    let node = frame.node;
                    stack.pop();
                    path.pop();
                    on_path.remove(&node);
                    visited.insert(node);
                }
            }
        }

        if !cycles.is_empty() {
            tracing::warn!(count = cycles.len(), "Circular dependencies detected");
        }
        cycles
    }

    /// Detect cycles and score the graph.
    #[tracing::instrument(skip_all, fields(packages = graph.package_count()))]
    pub fn analyze(&self, graph: &PackageGraph) -> CycleAnalysis {
        let cycles = self.detect(graph);
        let total_packages = graph.package_count();
        let health_score = health_score(cycles.len(), total_packages, &self.health);
        let build_order = if cycles.is_empty() {
            graph.build_order().ok()
        } else {
            None
        };
        tracing::info!(
            cycles = cycles.len(),
            health_score,
            "Cycle analysis complete"
        );
        CycleAnalysis {
            cycles,
            health_score,
            total_packages,
            build_order,
        }
    }

    fn report(graph: &PackageGraph, members: &[NodeIndex]) -> CycleReport {
        let packages: Vec<String> = members
            .iter()
            .map(|&idx| graph.node(idx).name.clone())
            .collect();
        let length = members.len().saturating_sub(1);

        let break_points: Vec<BreakPoint> = members
            .windows(2)
            .map(|pair| break_point(graph, pair[0], pair[1]))
            .collect();

        let mut affected: BTreeSet<String> = BTreeSet::new();
        for name in &packages {
            affected.insert(name.clone());
            affected.extend(graph.dependents_of(name).into_iter().map(String::from));
        }
        let impact = ImpactReport {
            affected_packages: affected.into_iter().collect(),
            estimated_hours: u32::try_from(length)
                .unwrap_or(u32::MAX)
                .saturating_mul(HOURS_PER_EDGE),
            effort: match length {
                0..=2 => Effort::Low,
                3..=4 => Effort::Medium,
                _ => Effort::High,
            },
        };

        let steps = resolution_steps(&packages, &break_points, impact.affected_packages.len());
        tracing::debug!(cycle = %packages.join(" -> "), length, "Found cycle");

        CycleReport {
            packages,
            length,
            break_points,
            impact,
            steps,
        }
    }
}

fn break_point(graph: &PackageGraph, from: NodeIndex, to: NodeIndex) -> BreakPoint {
    let source = graph.node(from);
    let target = graph.node(to);
    let (risk, rationale) = match (source.kind, target.kind) {
        (PackageKind::Library, PackageKind::Library) => (
            RiskLevel::Low,
            "both packages are libraries; shared code can move to a new package",
        ),
        (PackageKind::Application, _) => (
            RiskLevel::High,
            "the dependent is an application; its wiring usually needs this edge",
        ),
        (PackageKind::Library, PackageKind::Application) => (
            RiskLevel::Medium,
            "a library depending on an application; invert the dependency",
        ),
    };
    BreakPoint {
        from: source.name.clone(),
        to: target.name.clone(),
        risk,
        rationale: rationale.to_string(),
    }
}

fn resolution_steps(packages: &[String], break_points: &[BreakPoint], affected: usize) -> Vec<String> {
    let mut steps = vec![
        format!("Identify the cycle: {}", packages.join(" -> ")),
        "Analyze the imports along each edge to find what each package actually uses".to_string(),
    ];
    let choice = break_points
        .iter()
        .enumerate()
        .min_by_key(|(index, bp)| (bp.risk, *index))
        .map(|(_, bp)| bp);
    steps.push(match choice {
        Some(bp) => format!(
            "Choose a break point: {} -> {} ({} risk)",
            bp.from, bp.to, bp.risk
        ),
        None => "Choose a break point".to_string(),
    });
    steps.push(
        "Refactor: extract the shared code into a new package or invert the dependency"
            .to_string(),
    );
    steps.push(format!(
        "Test: build and run the test suites of the {affected} affected package(s)"
    ));
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(packages: &[(&str, PackageKind)], edges: &[(&str, &str)]) -> PackageGraph {
        let mut graph = PackageGraph::new();
        for (name, kind) in packages {
            graph.add_package(name, *kind);
        }
        for (from, to) in edges {
            graph.add_dependency(from, to).unwrap();
        }
        graph
    }

    fn libs<'a>(names: &[&'a str]) -> Vec<(&'a str, PackageKind)> {
        names.iter().map(|n| (*n, PackageKind::Library)).collect()
    }

    #[test]
    fn test_two_node_cycle() {
        let g = graph(&libs(&["a", "b"]), &[("a", "b"), ("b", "a")]);
        let cycles = CircularDetector::default().detect(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].length, 2);
        assert_eq!(cycles[0].packages, vec!["a", "b", "a"]);
        assert_eq!(cycles[0].break_points.len(), 2);
    }

    #[test]
    fn test_chain_has_no_cycle() {
        let g = graph(&libs(&["a", "b", "c"]), &[("a", "b"), ("b", "c")]);
        assert!(CircularDetector::default().detect(&g).is_empty());
    }

    #[test]
    fn test_three_node_cycle() {
        let g = graph(&libs(&["a", "b", "c"]), &[("a", "b"), ("b", "c"), ("c", "a")]);
        let cycles = CircularDetector::default().detect(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].length, 3);
        assert_eq!(cycles[0].path(), "a -> b -> c -> a");
    }

    #[test]
    fn test_disjoint_cycles_found_in_one_pass() {
        let g = graph(
            &libs(&["a", "b", "x", "y", "z"]),
            &[("a", "b"), ("b", "a"), ("x", "y"), ("y", "z"), ("z", "x")],
        );
        let cycles = CircularDetector::default().detect(&g);
        let lengths: Vec<usize> = cycles.iter().map(|c| c.length).collect();
        assert_eq!(lengths, vec![2, 3]);
    }

    #[test]
    fn test_self_dependency_is_a_cycle_of_one() {
        let g = graph(&libs(&["a"]), &[("a", "a")]);
        let cycles = CircularDetector::default().detect(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].length, 1);
    }

    #[test]
    fn test_break_point_risk_follows_package_kinds() {
        let g = graph(
            &[
                ("web", PackageKind::Application),
                ("ui", PackageKind::Library),
                ("core", PackageKind::Library),
            ],
            &[("web", "ui"), ("ui", "core"), ("core", "web")],
        );
        let report = &CircularDetector::default().detect(&g)[0];
        let risks: Vec<(&str, &str, RiskLevel)> = report
            .break_points
            .iter()
            .map(|bp| (bp.from.as_str(), bp.to.as_str(), bp.risk))
            .collect();
        assert_eq!(
            risks,
            vec![
                ("core", "web", RiskLevel::Medium),
                ("web", "ui", RiskLevel::High),
                ("ui", "core", RiskLevel::Low),
            ]
        );
        assert_eq!(report.recommended_break_point().unwrap().from, "ui");
    }

    #[test]
    fn test_impact_and_steps() {
        let g = graph(
            &libs(&["a", "b", "c", "consumer"]),
            &[("a", "b"), ("b", "a"), ("consumer", "a"), ("c", "consumer")],
        );
        let report = &CircularDetector::default().detect(&g)[0];
        assert_eq!(report.impact.affected_packages, vec!["a", "b", "consumer"]);
        assert_eq!(report.impact.estimated_hours, 2 * HOURS_PER_EDGE);
        assert_eq!(report.impact.effort, Effort::Low);

        assert_eq!(report.steps.len(), 5);
        assert!(report.steps[0].starts_with("Identify"));
        assert!(report.steps[1].starts_with("Analyze"));
        assert!(report.steps[2].starts_with("Choose a break point: a -> b"));
        assert!(report.steps[3].starts_with("Refactor"));
        assert!(report.steps[4].starts_with("Test"));
    }

    #[test]
    fn test_analyze_scores_and_orders() {
        let acyclic = graph(&libs(&["a", "b"]), &[("a", "b")]);
        let analysis = CircularDetector::default().analyze(&acyclic);
        assert_eq!(analysis.health_score, 100);
        assert_eq!(analysis.build_order, Some(vec!["b".to_string(), "a".to_string()]));

        let cyclic = graph(&libs(&["a", "b"]), &[("a", "b"), ("b", "a")]);
        let analysis = CircularDetector::default().analyze(&cyclic);
        assert_eq!(analysis.cycles.len(), 1);
        assert_eq!(analysis.health_score, 60);
        assert!(analysis.build_order.is_none());
    }
}
