//! `package.json` manifests.

use super::read_json_file;
use crate::error::{Error, Result};
use crate::types::{PackageKind, WorkspacePackage};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Directory names whose children are treated as applications.
const APPLICATION_DIRS: [&str; 3] = ["apps", "app", "applications"];

/// The subset of `package.json` monodep reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    /// `name`
    pub name: Option<String>,
    /// `version`
    pub version: Option<String>,
    /// `private`
    #[serde(default)]
    pub private: bool,
    /// `dependencies`
    #[serde(default, deserialize_with = "lenient_map")]
    pub dependencies: BTreeMap<String, String>,
    /// `devDependencies`
    #[serde(default, deserialize_with = "lenient_map")]
    pub dev_dependencies: BTreeMap<String, String>,
    /// `peerDependencies`
    #[serde(default, deserialize_with = "lenient_map")]
    pub peer_dependencies: BTreeMap<String, String>,
    /// `workspaces`, either a list or Yarn's `{ packages: [...] }` object.
    pub workspaces: Option<WorkspacesField>,
    /// `packageManager`, e.g. `pnpm@9.1.0`.
    pub package_manager: Option<String>,
    /// `main`
    pub main: Option<serde_json::Value>,
    /// `module`
    pub module: Option<serde_json::Value>,
    /// `exports`
    pub exports: Option<serde_json::Value>,
    /// `types`
    pub types: Option<serde_json::Value>,
}

/// The two shapes of the `workspaces` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WorkspacesField {
    /// `"workspaces": ["packages/*"]`
    List(Vec<String>),
    /// `"workspaces": { "packages": ["packages/*"], "nohoist": [...] }`
    Object {
        /// Member patterns.
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl WorkspacesField {
    /// The member patterns regardless of shape.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        match self {
            Self::List(patterns) | Self::Object { packages: patterns } => patterns,
        }
    }
}

/// Dependency maps occasionally hold non-string values; those entries are dropped.
fn lenient_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_json::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, value)| value.as_str().map(|range| (name, range.to_string())))
        .collect())
}

impl PackageJson {
    /// Read a manifest from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn read(path: &Path) -> Result<Self> {
        read_json_file(path)
    }

    fn has_entry_point(&self) -> bool {
        self.main.is_some() || self.module.is_some() || self.exports.is_some() || self.types.is_some()
    }

    /// Convert into a [`WorkspacePackage`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnnamedPackage`] when `name` is missing or blank.
    pub fn into_package(self, manifest_path: &Path, workspace_root: &Path) -> Result<WorkspacePackage> {
        let name = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(Error::UnnamedPackage {
                    path: manifest_path.to_path_buf(),
                });
            }
        };

        let path = manifest_path
            .parent()
            .unwrap_or(workspace_root)
            .to_path_buf();
        let kind = classify_package(&path, workspace_root, &self);

        Ok(WorkspacePackage {
            name,
            version: self.version.unwrap_or_else(|| "0.0.0".to_string()),
            path,
            manifest_path: manifest_path.to_path_buf(),
            dependencies: self.dependencies,
            dev_dependencies: self.dev_dependencies,
            peer_dependencies: self.peer_dependencies,
            private: self.private,
            kind,
            workspace_root: workspace_root.to_path_buf(),
        })
    }
}

/// Decide whether a package is an application or a library.
///
/// Packages under an `apps/`-style directory are applications, as are
/// private packages that expose no entry point.
fn classify_package(path: &Path, workspace_root: &Path, manifest: &PackageJson) -> PackageKind {
    let relative = path.strip_prefix(workspace_root).unwrap_or(path);
    let under_apps_dir = relative
        .components()
        .any(|c| APPLICATION_DIRS.iter().any(|dir| c.as_os_str() == *dir));

    if under_apps_dir || (manifest.private && !manifest.has_entry_point()) {
        PackageKind::Application
    } else {
        PackageKind::Library
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(json: &str) -> PackageJson {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_workspaces_list_and_object() {
        let list = parse(r#"{"workspaces": ["packages/*"]}"#);
        assert_eq!(list.workspaces.unwrap().patterns(), ["packages/*"]);

        let object = parse(r#"{"workspaces": {"packages": ["libs/*"], "nohoist": ["**/x"]}}"#);
        assert_eq!(object.workspaces.unwrap().patterns(), ["libs/*"]);
    }

    #[test]
    fn test_non_string_dependency_values_are_dropped() {
        let manifest = parse(r#"{"dependencies": {"a": "^1.0.0", "b": {"version": "2"}}}"#);
        assert_eq!(manifest.dependencies.len(), 1);
        assert_eq!(manifest.dependencies["a"], "^1.0.0");
    }

    #[test]
    fn test_into_package_requires_name() {
        let result = parse(r#"{"name": "  "}"#)
            .into_package(Path::new("/repo/packages/a/package.json"), Path::new("/repo"));
        assert!(matches!(result, Err(Error::UnnamedPackage { .. })));
    }

    #[test]
    fn test_into_package_defaults_version() {
        let package = parse(r#"{"name": "a"}"#)
            .into_package(Path::new("/repo/packages/a/package.json"), Path::new("/repo"))
            .unwrap();
        assert_eq!(package.version, "0.0.0");
        assert_eq!(package.path, PathBuf::from("/repo/packages/a"));
        assert_eq!(package.workspace_root, PathBuf::from("/repo"));
    }

    #[test]
    fn test_package_kind_rules() {
        let root = Path::new("/repo");

        let app = parse(r#"{"name": "web", "main": "index.js"}"#)
            .into_package(Path::new("/repo/apps/web/package.json"), root)
            .unwrap();
        assert_eq!(app.kind, PackageKind::Application);

        let private_leaf = parse(r#"{"name": "scripts", "private": true}"#)
            .into_package(Path::new("/repo/tools/scripts/package.json"), root)
            .unwrap();
        assert_eq!(private_leaf.kind, PackageKind::Application);

        let private_lib = parse(r#"{"name": "ui", "private": true, "exports": "./index.js"}"#)
            .into_package(Path::new("/repo/packages/ui/package.json"), root)
            .unwrap();
        assert_eq!(private_lib.kind, PackageKind::Library);

        let public = parse(r#"{"name": "core"}"#)
            .into_package(Path::new("/repo/packages/core/package.json"), root)
            .unwrap();
        assert_eq!(public.kind, PackageKind::Library);
    }
}
