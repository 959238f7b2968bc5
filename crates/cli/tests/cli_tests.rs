//! End-to-end runs of the `monodep` binary against temporary repositories.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const FIXTURE: &str = r#"{
  "packages": {
    "react": {"versions": {"17.0.2": {}, "18.2.0": {}}},
    "lodash": {"versions": {"4.17.21": {}}}
  }
}"#;

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Two packages depending on each other, plus an app on an older React.
fn repository() -> TempDir {
    let dir = tempfile::Builder::new()
        .prefix("monodep_test_")
        .tempdir()
        .unwrap();
    let root = dir.path();
    write(
        root,
        "package.json",
        r#"{"name": "root", "private": true, "workspaces": ["packages/*", "apps/*"]}"#,
    );
    write(
        root,
        "packages/ui/package.json",
        r#"{"name": "ui", "version": "1.0.0", "main": "index.js",
            "dependencies": {"core": "workspace:*", "react": "^18.0.0"}}"#,
    );
    write(
        root,
        "packages/core/package.json",
        r#"{"name": "core", "version": "1.0.0", "main": "index.js",
            "dependencies": {"ui": "workspace:*", "lodash": "^4.17.0"}}"#,
    );
    write(
        root,
        "apps/web/package.json",
        r#"{"name": "web", "version": "0.1.0", "private": true,
            "dependencies": {"react": "^17.0.0"}}"#,
    );
    write(root, "registry.json", FIXTURE);
    dir
}

fn monodep() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_monodep"));
    cmd.env_remove("RUST_LOG")
        .env_remove("MONODEP_CONFIG")
        .env("MONODEP_NO_CACHE", "true");
    cmd
}

#[test]
fn test_analyze_prints_a_summary() {
    let repo = repository();
    monodep()
        .arg("analyze")
        .arg(repo.path())
        .arg("--registry-fixture")
        .arg(repo.path().join("registry.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("conflicts            1"))
        .stdout(predicate::str::contains("react: 17.0.2, 18.2.0"))
        .stdout(predicate::str::contains("cycles               1"));
}

#[test]
fn test_analyze_json_output() {
    let repo = repository();
    let output = monodep()
        .arg("analyze")
        .arg(repo.path())
        .arg("--registry-fixture")
        .arg(repo.path().join("registry.json"))
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["tree"]["conflicts"][0]["package_name"], "react");
    assert_eq!(report["cycles"]["cycles"].as_array().unwrap().len(), 1);
    assert_eq!(report["degradation"]["complete"], true);
}

#[test]
fn test_fail_on_findings_sets_exit_code() {
    let repo = repository();
    monodep()
        .arg("analyze")
        .arg(repo.path())
        .arg("--registry-fixture")
        .arg(repo.path().join("registry.json"))
        .args(["--fail-on", "cycles"])
        .assert()
        .code(1);
}

#[test]
fn test_cycles_command() {
    let repo = repository();
    monodep()
        .arg("cycles")
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("core -> ui -> core"));

    monodep()
        .arg("cycles")
        .arg(repo.path())
        .arg("--strict")
        .assert()
        .code(1);
}

#[test]
fn test_json_envelope() {
    let repo = repository();
    let output = monodep()
        .args(["--json", "cycles"])
        .arg(repo.path())
        .output()
        .unwrap();
    let envelope: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(envelope["status"], "ok");
    assert!(envelope["data"]["cycles"]["health_score"].as_u64().unwrap() < 100);
}

#[test]
fn test_missing_config_is_a_cli_error() {
    let repo = repository();
    monodep()
        .arg("cycles")
        .arg(repo.path())
        .args(["--config", "does-not-exist.toml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_missing_root_is_an_analysis_error() {
    let repo = repository();
    monodep()
        .arg("cycles")
        .arg(repo.path().join("nowhere"))
        .assert()
        .code(3);
}

#[test]
fn test_cache_stats_use_the_cache_dir() {
    let repo = repository();
    let cache = TempDir::new().unwrap();
    monodep()
        .args(["cache", "stats"])
        .arg(repo.path())
        .env("MONODEP_CACHE_DIR", cache.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("nodes"))
        .stdout(predicate::str::contains("trees"));
    assert!(cache.path().join("nodes").is_dir());
}
