//! End-to-end package discovery over temporary repositories.

use monodep_recovery::{ErrorHandler, ErrorKind};
use monodep_workspaces::{DiscoveryOptions, Error, PackageKind, WorkspaceKind, WorkspaceParser};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn pnpm_repo() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "package.json", r#"{"name": "root", "private": true}"#);
    write(
        root,
        "pnpm-workspace.yaml",
        "packages:\n  - 'apps/*'\n  - 'packages/*'\n  - '!packages/legacy'\n",
    );
    write(
        root,
        "apps/web/package.json",
        r#"{"name": "web", "version": "1.0.0", "private": true,
            "dependencies": {"ui": "workspace:*", "react": "^18.2.0"}}"#,
    );
    write(
        root,
        "packages/ui/package.json",
        r#"{"name": "ui", "version": "0.3.0", "main": "index.js",
            "dependencies": {"react": "^18.0.0"},
            "devDependencies": {"vitest": "^1.2.0"},
            "peerDependencies": {"react-dom": "^18.0.0"}}"#,
    );
    write(root, "packages/legacy/package.json", r#"{"name": "legacy"}"#);
    write(root, "packages/ui/node_modules/react/package.json", r#"{"name": "react"}"#);
    temp_dir
}

#[test]
fn test_discovers_pnpm_workspace() {
    let repo = pnpm_repo();
    let report = WorkspaceParser::default()
        .discover_packages(repo.path())
        .unwrap();

    assert_eq!(report.configurations.len(), 1);
    assert_eq!(report.configurations[0].kind, WorkspaceKind::Pnpm);

    let names: Vec<&str> = report.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["web", "ui"]);
    assert!(report.is_complete());

    let web = report.package("web").unwrap();
    assert_eq!(web.kind, PackageKind::Application);
    assert_eq!(web.workspace_root, repo.path());
    assert_eq!(web.dependencies["react"], "^18.2.0");

    let ui = report.package("ui").unwrap();
    assert_eq!(ui.kind, PackageKind::Library);
    assert_eq!(ui.dev_dependencies["vitest"], "^1.2.0");
    assert_eq!(ui.peer_dependencies["react-dom"], "^18.0.0");
}

#[test]
fn test_malformed_manifest_is_skipped_and_reported() {
    let repo = pnpm_repo();
    write(repo.path(), "packages/broken/package.json", r#"{"name": "broken",}"#);
    write(repo.path(), "packages/nameless/package.json", r#"{"version": "1.0.0"}"#);

    let handler = Arc::new(ErrorHandler::with_default_strategies(100));
    let report = WorkspaceParser::default()
        .with_error_handler(Arc::clone(&handler))
        .discover_packages(repo.path())
        .unwrap();

    assert_eq!(report.packages.len(), 2);
    assert_eq!(report.skipped_manifests.len(), 2);
    assert!(!report.is_complete());

    let stats = handler.statistics();
    assert_eq!(stats.by_kind.get(&ErrorKind::JsonParse), Some(&2));
    assert_eq!(stats.successful_recoveries, 2);
}

#[test]
fn test_overlapping_configurations_deduplicate_packages() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write(root, "pnpm-workspace.yaml", "packages:\n  - 'packages/**'\n");
    write(
        root,
        "packages/group/package.json",
        r#"{"name": "group", "private": true, "workspaces": ["*"]}"#,
    );
    write(root, "packages/group/x/package.json", r#"{"name": "x", "version": "1.0.0"}"#);

    let report = WorkspaceParser::default().discover_packages(root).unwrap();
    assert_eq!(report.configurations.len(), 2);

    let xs: Vec<_> = report.packages.iter().filter(|p| p.name == "x").collect();
    assert_eq!(xs.len(), 1);
    assert_eq!(xs[0].workspace_root, root);
}

#[test]
fn test_single_package_repository() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "package.json", r#"{"name": "solo", "version": "2.0.0"}"#);

    let report = WorkspaceParser::default()
        .discover_packages(temp_dir.path())
        .unwrap();
    assert!(report.configurations.is_empty());
    assert_eq!(report.packages.len(), 1);
    assert_eq!(report.packages[0].name, "solo");
}

#[test]
fn test_empty_repository() {
    let temp_dir = TempDir::new().unwrap();
    let report = WorkspaceParser::default()
        .discover_packages(temp_dir.path())
        .unwrap();
    assert!(report.packages.is_empty());
}

#[test]
fn test_missing_root_is_fatal() {
    let result = WorkspaceParser::new(DiscoveryOptions::default())
        .discover_packages(Path::new("/no/such/monorepo"));
    assert!(matches!(result, Err(Error::WorkspaceNotFound { .. })));
}
