//! Workspace configuration discovery.
//!
//! One traversal of the repository collects every recognised configuration
//! file. When several describe the same root, the one with the lowest
//! [`WorkspaceKind::priority`] is kept.

use super::manifest::PackageJson;
use super::{read_json_file, read_yaml_file};
use crate::detection::{detect_package_manager, is_yarn_root};
use crate::error::{Error, Result};
use crate::types::{DiscoveryOptions, SkippedFile, WorkspaceConfiguration, WorkspaceKind};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const PNPM_WORKSPACE: &str = "pnpm-workspace.yaml";
const LERNA_JSON: &str = "lerna.json";
const NX_JSON: &str = "nx.json";
const WORKSPACE_JSON: &str = "workspace.json";
const PACKAGE_JSON: &str = "package.json";

#[derive(Debug, Default, Deserialize)]
struct PnpmWorkspace {
    #[serde(default)]
    packages: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LernaJson {
    packages: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NxJson {
    workspace_layout: Option<NxLayout>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NxLayout {
    apps_dir: Option<String>,
    libs_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NxWorkspaceJson {
    #[serde(default)]
    projects: BTreeMap<String, NxProject>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NxProject {
    Path(String),
    Config { root: String },
}

impl NxProject {
    fn root(&self) -> &str {
        match self {
            Self::Path(root) | Self::Config { root } => root,
        }
    }
}

/// Configurations found under a repository root.
#[derive(Debug, Default)]
pub struct ConfigurationScan {
    /// Configurations in effect, ordered by priority then root path.
    pub configurations: Vec<WorkspaceConfiguration>,
    /// Files that looked like configurations but could not be parsed.
    pub skipped: Vec<SkippedFile>,
    /// Configurations that lost to a higher-priority one for the same root.
    pub superseded: Vec<Error>,
}

/// Discover every workspace configuration beneath `root`.
///
/// # Errors
///
/// Returns [`Error::WorkspaceNotFound`] if `root` is not a directory.
/// Unparsable configuration files are reported in
/// [`ConfigurationScan::skipped`] instead of failing.
pub fn discover_configurations(root: &Path, options: &DiscoveryOptions) -> Result<ConfigurationScan> {
    if !root.is_dir() {
        return Err(Error::WorkspaceNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut scan = ConfigurationScan::default();
    let mut found = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !options.is_ignored(&e.file_name().to_string_lossy())
        });

    for entry in walker.filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(dir) = entry.path().parent() else {
            continue;
        };

        let parsed = match entry.file_name().to_str() {
            Some(PNPM_WORKSPACE) => parse_pnpm(entry.path(), dir).map(Some),
            Some(LERNA_JSON) => parse_lerna(entry.path(), dir).map(Some),
            Some(NX_JSON) => parse_nx(entry.path(), dir).map(Some),
            Some(WORKSPACE_JSON) => parse_workspace_json(entry.path(), dir).map(Some),
            Some(PACKAGE_JSON) => parse_package_json(entry.path(), dir),
            _ => continue,
        };

        match parsed {
            Ok(Some(config)) => {
                tracing::debug!(
                    "Found {} workspace configuration at {}",
                    config.kind,
                    config.config_path.display()
                );
                found.push(config);
            }
            Ok(None) => {}
            // Member manifests are reported by package discovery.
            Err(e) if entry.depth() > 1 && entry.file_name() == PACKAGE_JSON => {
                tracing::debug!("Ignoring unreadable manifest during configuration scan: {e}");
            }
            Err(e) => {
                tracing::warn!("Skipping workspace configuration: {e}");
                scan.skipped.push(SkippedFile {
                    path: entry.path().to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let (configurations, superseded) = apply_precedence(found);
    scan.configurations = configurations;
    scan.superseded = superseded;
    Ok(scan)
}

/// Keep one configuration per root: the lowest priority number wins, then
/// the first `config_path`. Every other configuration for that root is
/// reported as superseded.
fn apply_precedence(found: Vec<WorkspaceConfiguration>) -> (Vec<WorkspaceConfiguration>, Vec<Error>) {
    let mut by_root: HashMap<PathBuf, Vec<WorkspaceConfiguration>> = HashMap::new();
    for config in found {
        by_root.entry(config.root_path.clone()).or_default().push(config);
    }

    let mut kept = Vec::new();
    let mut superseded = Vec::new();

    for (root, mut configs) in by_root {
        configs.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.config_path.cmp(&b.config_path))
        });
        let mut iter = configs.into_iter();
        let Some(winner) = iter.next() else {
            continue;
        };

        for other in iter {
            tracing::warn!(
                "Ignoring {} in favour of {}",
                other.config_path.display(),
                winner.config_path.display()
            );
            superseded.push(Error::ConflictingConfigurations {
                root: root.clone(),
                kept: winner.config_path.display().to_string(),
                ignored: other.config_path.display().to_string(),
            });
        }
        kept.push(winner);
    }

    kept.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.root_path.cmp(&b.root_path))
    });
    (kept, superseded)
}

fn configuration(
    kind: WorkspaceKind,
    dir: &Path,
    config_path: &Path,
    packages: Vec<String>,
    manifest: Option<&PackageJson>,
) -> WorkspaceConfiguration {
    WorkspaceConfiguration {
        kind,
        root_path: dir.to_path_buf(),
        config_path: config_path.to_path_buf(),
        packages,
        package_manager: detect_package_manager(dir, manifest, kind),
        priority: kind.priority(),
    }
}

fn root_manifest(dir: &Path) -> Option<PackageJson> {
    let path = dir.join(PACKAGE_JSON);
    path.is_file().then(|| PackageJson::read(&path).ok()).flatten()
}

fn parse_pnpm(path: &Path, dir: &Path) -> Result<WorkspaceConfiguration> {
    let workspace: Option<PnpmWorkspace> = read_yaml_file(path)?;
    let packages = workspace.unwrap_or_default().packages;
    Ok(configuration(
        WorkspaceKind::Pnpm,
        dir,
        path,
        packages,
        root_manifest(dir).as_ref(),
    ))
}

fn parse_lerna(path: &Path, dir: &Path) -> Result<WorkspaceConfiguration> {
    let lerna: LernaJson = read_json_file(path)?;
    let manifest = root_manifest(dir);

    // Lerna 7+ reads members from package.json workspaces when packages is omitted.
    let packages = lerna
        .packages
        .or_else(|| {
            manifest
                .as_ref()
                .and_then(|m| m.workspaces.as_ref())
                .map(|w| w.patterns().to_vec())
        })
        .unwrap_or_else(|| vec!["packages/*".to_string()]);

    Ok(configuration(
        WorkspaceKind::Lerna,
        dir,
        path,
        packages,
        manifest.as_ref(),
    ))
}

fn parse_nx(path: &Path, dir: &Path) -> Result<WorkspaceConfiguration> {
    let nx: NxJson = read_json_file(path)?;
    let layout = nx.workspace_layout.unwrap_or_default();
    let packages = vec![
        format!("{}/*", layout.apps_dir.as_deref().unwrap_or("apps").trim_end_matches('/')),
        format!("{}/*", layout.libs_dir.as_deref().unwrap_or("libs").trim_end_matches('/')),
    ];
    Ok(configuration(
        WorkspaceKind::Nx,
        dir,
        path,
        packages,
        root_manifest(dir).as_ref(),
    ))
}

fn parse_workspace_json(path: &Path, dir: &Path) -> Result<WorkspaceConfiguration> {
    let workspace: NxWorkspaceJson = read_json_file(path)?;
    if workspace.projects.is_empty() {
        return Err(Error::InvalidWorkspaceConfig {
            path: path.to_path_buf(),
            message: "no projects declared".to_string(),
        });
    }
    let packages = workspace
        .projects
        .values()
        .map(|p| p.root().trim_end_matches('/').to_string())
        .collect();
    Ok(configuration(
        WorkspaceKind::Nx,
        dir,
        path,
        packages,
        root_manifest(dir).as_ref(),
    ))
}

/// A `package.json` is a configuration only when it declares `workspaces`.
fn parse_package_json(path: &Path, dir: &Path) -> Result<Option<WorkspaceConfiguration>> {
    let manifest = PackageJson::read(path)?;
    let Some(workspaces) = manifest.workspaces.as_ref() else {
        return Ok(None);
    };

    let kind = if is_yarn_root(dir, &manifest) {
        WorkspaceKind::Yarn
    } else {
        WorkspaceKind::Npm
    };
    let packages = workspaces.patterns().to_vec();
    Ok(Some(configuration(kind, dir, path, packages, Some(&manifest))))
}
