//! Property-based tests for cycle detection.
//!
//! - Graphs whose edges only point to earlier packages never report a cycle
//! - A ring of any size is reported once, with one break point per edge
//! - Every reported cycle is closed and made of real edges

use monodep_cycles::{CircularDetector, HealthScoreConfig, PackageGraph, health_score};
use monodep_workspaces::PackageKind;
use proptest::prelude::*;

fn kind_strategy() -> impl Strategy<Value = PackageKind> {
    prop_oneof![Just(PackageKind::Library), Just(PackageKind::Application)]
}

/// Packages `p0..pn`, each depending on some earlier ones.
fn dag_strategy(max: usize) -> impl Strategy<Value = Vec<(PackageKind, Vec<usize>)>> {
    (1..=max).prop_flat_map(|count| {
        let packages: Vec<_> = (0..count)
            .map(|i| {
                let deps = if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    proptest::collection::vec(0..i, 0..=i.min(3)).boxed()
                };
                (kind_strategy(), deps)
            })
            .collect();
        packages
    })
}

/// Arbitrary edges over `n` packages.
fn any_graph_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2..=10_usize).prop_flat_map(|count| {
        (
            Just(count),
            proptest::collection::vec((0..count, 0..count), 0..=count * 2),
        )
    })
}

fn name(i: usize) -> String {
    format!("p{i:02}")
}

fn build(packages: &[(PackageKind, Vec<usize>)]) -> PackageGraph {
    let mut graph = PackageGraph::new();
    for (i, (kind, _)) in packages.iter().enumerate() {
        graph.add_package(&name(i), *kind);
    }
    for (i, (_, deps)) in packages.iter().enumerate() {
        for dep in deps {
            graph.add_dependency(&name(i), &name(*dep)).unwrap();
        }
    }
    graph
}

proptest! {
    #[test]
    fn dags_have_no_cycles(packages in dag_strategy(20)) {
        let graph = build(&packages);
        let analysis = CircularDetector::default().analyze(&graph);
        prop_assert!(analysis.cycles.is_empty());
        prop_assert_eq!(analysis.health_score, 100);

        let order = analysis.build_order.unwrap();
        prop_assert_eq!(order.len(), packages.len());
        let position = |n: &str| order.iter().position(|o| o == n).unwrap();
        for (i, (_, deps)) in packages.iter().enumerate() {
            for dep in deps {
                prop_assert!(position(&name(*dep)) < position(&name(i)));
            }
        }
    }

    #[test]
    fn rings_are_found_once(size in 2..=12_usize) {
        let mut graph = PackageGraph::new();
        for i in 0..size {
            graph.add_package(&name(i), PackageKind::Library);
        }
        for i in 0..size {
            graph.add_dependency(&name(i), &name((i + 1) % size)).unwrap();
        }

        let cycles = CircularDetector::default().detect(&graph);
        prop_assert_eq!(cycles.len(), 1);
        prop_assert_eq!(cycles[0].length, size);
        prop_assert_eq!(cycles[0].break_points.len(), size);
        prop_assert_eq!(cycles[0].packages.first(), cycles[0].packages.last());
    }

    #[test]
    fn reported_cycles_are_real((count, edges) in any_graph_strategy()) {
        let mut graph = PackageGraph::new();
        for i in 0..count {
            graph.add_package(&name(i), PackageKind::Library);
        }
        for (from, to) in &edges {
            graph.add_dependency(&name(*from), &name(*to)).unwrap();
        }

        let cycles = CircularDetector::default().detect(&graph);
        prop_assert_eq!(cycles.is_empty(), !graph.has_cycles());
        for cycle in &cycles {
            prop_assert_eq!(cycle.packages.len(), cycle.length + 1);
            prop_assert_eq!(cycle.packages.first(), cycle.packages.last());
            for pair in cycle.packages.windows(2) {
                prop_assert!(graph.dependencies_of(&pair[0]).contains(&pair[1].as_str()));
            }
        }
    }

    #[test]
    fn health_score_stays_in_range(cycles in 0..500_usize, total in 0..500_usize, max_penalty in 0..200_u32) {
        let score = health_score(cycles, total, &HealthScoreConfig { max_penalty });
        prop_assert!(score <= 100);
        if cycles == 0 {
            prop_assert_eq!(score, 100);
        }
    }
}
