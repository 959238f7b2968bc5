//! End-to-end tree builds against the in-memory registry.

use monodep_cache::{CacheConfig, ResolutionCache};
use monodep_recovery::{ErrorHandler, ErrorKind};
use monodep_registry::{MockFailure, MockRegistry};
use monodep_resolver::{
    BuildOptions, DependencyTree, DependencyTreeResolver, Error, PackageNode, ResolutionSource,
    ResolutionStrategy,
};
use monodep_workspaces::{PackageKind, WorkspacePackage};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn deps(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(n, r)| ((*n).to_string(), (*r).to_string()))
        .collect()
}

fn package(name: &str, dependencies: &[(&str, &str)]) -> WorkspacePackage {
    WorkspacePackage {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        path: PathBuf::from(format!("/repo/packages/{name}")),
        manifest_path: PathBuf::from(format!("/repo/packages/{name}/package.json")),
        dependencies: deps(dependencies),
        dev_dependencies: BTreeMap::new(),
        peer_dependencies: BTreeMap::new(),
        private: false,
        kind: PackageKind::Library,
        workspace_root: PathBuf::from("/repo"),
    }
}

fn registry() -> Arc<MockRegistry> {
    Arc::new(
        MockRegistry::new()
            .with_version("react", "18.2.0", &[("loose-envify", "^1.1.0")])
            .with_version("loose-envify", "1.4.0", &[("js-tokens", "^4.0.0")])
            .with_version("js-tokens", "4.0.0", &[])
            .with_version("express", "4.18.2", &[("debug", "2.6.9")])
            .with_version("debug", "2.6.9", &[])
            .with_version("typescript", "5.3.3", &[]),
    )
}

fn resolver(registry: &Arc<MockRegistry>) -> DependencyTreeResolver {
    DependencyTreeResolver::new(
        registry.clone(),
        Arc::new(ErrorHandler::with_default_strategies(100)),
    )
}

fn options() -> BuildOptions {
    BuildOptions {
        package_timeout: Duration::from_secs(5),
        ..BuildOptions::default()
    }
}

fn child<'a>(node: &'a PackageNode, name: &str) -> &'a PackageNode {
    node.dependencies
        .get(name)
        .unwrap_or_else(|| panic!("{} has no dependency {name}", node.name))
}

async fn build(
    resolver: &DependencyTreeResolver,
    packages: &[WorkspacePackage],
    options: &BuildOptions,
) -> DependencyTree {
    resolver
        .build_tree(packages, options, CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_builds_registry_and_workspace_edges() {
    let registry = registry();
    let packages = vec![
        package("ui", &[("react", "^18.0.0")]),
        package("web", &[("ui", "workspace:*"), ("express", "^4.0.0")]),
    ];
    let tree = build(&resolver(&registry), &packages, &options()).await;

    assert_eq!(tree.root_packages.len(), 2);
    assert_eq!(tree.root_packages[0].name, "ui");
    assert_eq!(tree.root_packages[1].name, "web");

    let web = tree.root("web").unwrap();
    let ui = child(web, "ui");
    assert!(ui.is_workspace);
    assert_eq!(ui.resolution_source, ResolutionSource::Workspace);
    assert_eq!(ui.depth, 1);

    let react = child(ui, "react");
    assert_eq!(react.version, "18.2.0");
    assert_eq!(react.depth, 2);
    assert_eq!(child(child(react, "loose-envify"), "js-tokens").depth, 4);

    assert!(tree.is_complete());
    assert!(tree.conflicts.is_empty());
    assert_eq!(tree.metadata.workspace_packages, 3);
    assert_eq!(tree.metadata.max_depth, 4);
    assert!(tree.all_packages.contains_key("react@18.2.0"));
    assert_eq!(tree.versions_of("react").count(), 1);
}

#[tokio::test]
async fn test_max_depth_bounds_the_tree() {
    let registry = Arc::new(
        MockRegistry::new()
            .with_version("a", "1.0.0", &[("b", "^1.0.0")])
            .with_version("b", "1.0.0", &[("c", "^1.0.0")])
            .with_version("c", "1.0.0", &[("d", "^1.0.0")])
            .with_version("d", "1.0.0", &[("e", "^1.0.0")])
            .with_version("e", "1.0.0", &[]),
    );
    let packages = vec![package("app", &[("a", "^1.0.0")])];
    let tree = build(
        &resolver(&registry),
        &packages,
        &BuildOptions {
            max_depth: 1,
            ..options()
        },
    )
    .await;

    assert_eq!(tree.metadata.max_depth, 1);
    assert_eq!(tree.metadata.truncated_subtrees, 1);
    assert_eq!(tree.metadata.total_nodes, 2);
    assert!(child(tree.root("app").unwrap(), "a").dependencies.is_empty());
    // Truncation is not a failure.
    assert!(tree.is_complete());
    assert_eq!(registry.calls().resolve_version, 1);
}

#[tokio::test]
async fn test_failed_dependencies_degrade_the_tree() {
    let registry = registry();
    registry.fail("express", MockFailure::NotFound);
    let packages = vec![
        package("web", &[("react", "^18.0.0"), ("left-pad", "^1.0.0")]),
        package("api", &[("express", "^4.0.0")]),
        package("tools", &[("typescript", "^5.0.0")]),
    ];
    let tree = build(&resolver(&registry), &packages, &options()).await;

    let names: Vec<&str> = tree.root_packages.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["web", "api", "tools"]);
    assert_eq!(tree.metadata.failed_roots, 1);
    assert!(tree.root("api").unwrap().dependencies.is_empty());
    assert_eq!(tree.metadata.unresolved_subtrees, 2);
    assert!(!tree.is_complete());

    let web = tree.root("web").unwrap();
    assert!(web.dependencies.contains_key("react"));
    assert!(!web.dependencies.contains_key("left-pad"));

    let failed: Vec<&str> = tree.failures.iter().map(|f| f.package.as_str()).collect();
    assert_eq!(failed, vec!["express", "left-pad"]);
    assert!(tree.failures.iter().all(|f| f.kind == ErrorKind::DependencyTree));
    assert_eq!(tree.failures[0].parent.as_deref(), Some("api"));
}

#[tokio::test]
async fn test_failed_root_stays_in_the_tree() {
    let registry = registry();
    let packages = vec![
        package("web", &[("react", "^18.0.0")]),
        package("api", &[("internal-auth", "^1.0.0")]),
    ];
    let tree = build(&resolver(&registry), &packages, &options()).await;

    let names: Vec<&str> = tree.root_packages.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["web", "api"]);
    let api = tree.root("api").unwrap();
    assert!(api.is_workspace);
    assert!(api.dependencies.is_empty());
    assert!(tree.all_packages.contains_key("api@1.0.0"));
    assert_eq!(tree.metadata.workspace_packages, 2);
    assert_eq!(tree.metadata.failed_roots, 1);
    assert_eq!(tree.failures.len(), 1);
    assert_eq!(tree.failures[0].parent.as_deref(), Some("api"));
    assert!(!tree.is_complete());
}

#[tokio::test]
async fn test_all_roots_failing_is_an_error() {
    let registry = registry();
    let packages = vec![
        package("a", &[("missing-one", "^1.0.0")]),
        package("b", &[("missing-two", "^1.0.0")]),
    ];
    let err = resolver(&registry)
        .build_tree(&packages, &options(), CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        Error::AllRootsFailed { count, reasons } => {
            assert_eq!(count, 2);
            assert_eq!(reasons.len(), 2);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_roots_without_dependencies_never_fail() {
    let registry = registry();
    let tree = build(&resolver(&registry), &[package("empty", &[])], &options()).await;
    assert_eq!(tree.root_packages.len(), 1);
    assert_eq!(tree.metadata.total_nodes, 1);
    assert_eq!(registry.calls().total(), 0);
}

#[tokio::test]
async fn test_flaky_registry_is_retried() {
    let registry = registry();
    registry.fail("express", MockFailure::Flaky { remaining: 1 });
    let resolver = resolver(&registry);
    let tree = build(&resolver, &[package("api", &[("express", "^4.0.0")])], &options()).await;

    assert!(tree.is_complete());
    assert_eq!(child(tree.root("api").unwrap(), "express").version, "4.18.2");
    assert_eq!(tree.metadata.recovery_actions, 1);
    assert_eq!(resolver.error_handler().statistics().total, 1);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let registry = registry();
    registry.fail("express", MockFailure::Network);
    let packages = vec![package("api", &[("express", "^4.0.0"), ("react", "^18.0.0")])];
    let tree = build(
        &resolver(&registry),
        &packages,
        &BuildOptions {
            retry_attempts: 1,
            ..options()
        },
    )
    .await;

    assert_eq!(tree.failures.len(), 1);
    assert_eq!(tree.failures[0].kind, ErrorKind::Network);
    // One first attempt and one retry.
    assert_eq!(registry.calls().resolve_version, 2 + 3);
}

#[tokio::test]
async fn test_hanging_registry_times_out() {
    let registry = registry();
    registry.fail("express", MockFailure::Hang);
    let packages = vec![package("api", &[("express", "^4.0.0"), ("react", "^18.0.0")])];
    let tree = build(
        &resolver(&registry),
        &packages,
        &BuildOptions {
            package_timeout: Duration::from_millis(50),
            ..BuildOptions::default()
        },
    )
    .await;

    assert_eq!(tree.failures.len(), 1);
    assert_eq!(tree.failures[0].package, "express");
    assert_eq!(tree.failures[0].kind, ErrorKind::Timeout);
    assert!(tree.root("api").unwrap().dependencies.contains_key("react"));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let registry = registry();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = resolver(&registry)
        .build_tree(&[package("web", &[("react", "^18.0.0")])], &options(), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(registry.calls().total(), 0);
}

#[tokio::test]
async fn test_cancelled_while_waiting_on_registry() {
    let registry = registry();
    registry.fail("express", MockFailure::Hang);
    let resolver = resolver(&registry);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let packages = vec![package("api", &[("express", "^4.0.0")])];
    let err = resolver
        .build_tree(&packages, &options(), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn test_node_cache_makes_rebuilds_identical() {
    let registry = registry();
    let nodes = Arc::new(ResolutionCache::<PackageNode>::in_memory(
        CacheConfig::default(),
        "nodes",
    ));
    let resolver = resolver(&registry).with_node_cache(nodes);
    let packages = vec![
        package("web", &[("react", "^18.0.0")]),
        package("api", &[("express", "^4.0.0")]),
    ];

    let first = build(&resolver, &packages, &options()).await;
    let calls = registry.calls();
    let second = build(&resolver, &packages, &options()).await;

    assert_eq!(registry.calls(), calls);
    assert_eq!(first.all_packages.keys().collect::<Vec<_>>(), second.all_packages.keys().collect::<Vec<_>>());
    let react = child(second.root("web").unwrap(), "react");
    assert_eq!(react.resolution_source, ResolutionSource::Cache);
    assert_eq!(react.depth, 1);
    assert_eq!(child(react, "loose-envify").depth, 2);
    assert!(second.metadata.cache_hit_rate > 0.0);
}

#[tokio::test]
async fn test_node_cache_is_bypassed_when_disabled() {
    let registry = registry();
    let nodes = Arc::new(ResolutionCache::<PackageNode>::in_memory(
        CacheConfig::default(),
        "nodes",
    ));
    let resolver = resolver(&registry).with_node_cache(nodes.clone());
    let packages = vec![package("web", &[("react", "^18.0.0")])];
    let options = BuildOptions {
        use_cache: false,
        ..options()
    };

    build(&resolver, &packages, &options).await;
    build(&resolver, &packages, &options).await;
    assert_eq!(registry.calls().resolve_version, 6);
    assert_eq!(nodes.stats().hot_entries + nodes.stats().warm_entries, 0);
}

#[tokio::test]
async fn test_complete_trees_are_cached() {
    let registry = registry();
    let trees = Arc::new(ResolutionCache::<DependencyTree>::in_memory(
        CacheConfig::default(),
        "trees",
    ));
    let resolver = resolver(&registry).with_tree_cache(trees);
    let packages = vec![package("web", &[("react", "^18.0.0")])];

    let first = build(&resolver, &packages, &options()).await;
    assert!(!first.metadata.from_cache);
    let calls = registry.calls();

    let second = build(&resolver, &packages, &options()).await;
    assert!(second.metadata.from_cache);
    assert_eq!(registry.calls(), calls);
    assert_eq!(second.metadata.input_hash, first.metadata.input_hash);

    // Different options build afresh.
    let third = build(
        &resolver,
        &packages,
        &BuildOptions {
            max_depth: 1,
            ..options()
        },
    )
    .await;
    assert!(!third.metadata.from_cache);
}

#[tokio::test]
async fn test_incomplete_trees_are_not_cached() {
    let registry = registry();
    let trees = Arc::new(ResolutionCache::<DependencyTree>::in_memory(
        CacheConfig::default(),
        "trees",
    ));
    let resolver = resolver(&registry).with_tree_cache(trees);
    let packages = vec![package("web", &[("react", "^18.0.0"), ("left-pad", "^1.0.0")])];

    build(&resolver, &packages, &options()).await;
    let second = build(&resolver, &packages, &options()).await;
    assert!(!second.metadata.from_cache);
}

#[tokio::test]
async fn test_patch_conflict_is_auto_resolved() {
    let registry = Arc::new(
        MockRegistry::new()
            .with_version("lodash", "4.17.20", &[])
            .with_version("lodash", "4.17.21", &[]),
    );
    registry.set_latest("lodash", "4.17.20");
    let packages = vec![
        package("web", &[("lodash", "latest")]),
        package("api", &[("lodash", "^4.17.21")]),
    ];
    let tree = build(
        &resolver(&registry),
        &packages,
        &BuildOptions {
            auto_resolve_conflicts: true,
            ..options()
        },
    )
    .await;

    assert_eq!(tree.metadata.conflict_count, 1);
    assert_eq!(tree.metadata.auto_resolved_conflicts, 1);
    let conflict = &tree.conflicts[0];
    assert_eq!(conflict.package_name(), "lodash");
    assert_eq!(conflict.affected_packages, vec!["api", "web"]);
    let applied = conflict.applied_resolution.as_ref().unwrap();
    assert_eq!(applied.strategy, ResolutionStrategy::AdoptSuggested);
    assert_eq!(applied.target.to_string(), "4.17.21");
}

#[tokio::test]
async fn test_conflicts_are_reported_without_auto_resolution() {
    let registry = Arc::new(
        MockRegistry::new()
            .with_version("react", "17.0.2", &[])
            .with_version("react", "18.2.0", &[]),
    );
    let packages = vec![
        package("legacy", &[("react", "^17.0.0")]),
        package("web", &[("react", "^18.0.0")]),
    ];
    let tree = build(&resolver(&registry), &packages, &options()).await;

    assert_eq!(tree.conflicts.len(), 1);
    assert!(!tree.conflicts[0].auto_resolvable);
    assert!(tree.conflicts[0].applied_resolution.is_none());
    assert_eq!(tree.metadata.auto_resolved_conflicts, 0);
}

#[tokio::test]
async fn test_dev_and_peer_dependencies_follow_options() {
    let registry = registry();
    let mut web = package("web", &[("react", "^18.0.0")]);
    web.dev_dependencies = deps(&[("typescript", "^5.0.0")]);
    web.peer_dependencies = deps(&[("express", "^4.0.0")]);
    let packages = vec![web];

    let tree = build(&resolver(&registry), &packages, &options()).await;
    let root = tree.root("web").unwrap();
    assert!(root.dev_dependencies.contains_key("typescript"));
    assert!(root.peer_dependencies.is_empty());

    let tree = build(
        &resolver(&registry),
        &packages,
        &BuildOptions {
            include_dev_dependencies: false,
            include_peer_dependencies: true,
            ..options()
        },
    )
    .await;
    let root = tree.root("web").unwrap();
    assert!(root.dev_dependencies.is_empty());
    assert!(root.peer_dependencies.contains_key("express"));
}
