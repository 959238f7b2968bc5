//! Package manager detection.
//!
//! The client managing a workspace root is taken from, in order:
//!
//! 1. the `packageManager` field of the root `package.json` (`pnpm@9.1.0`)
//! 2. the lockfile present in the root
//! 3. the default client of the workspace convention
//!
//! ```
//! use monodep_workspaces::detection::parse_package_manager_hint;
//!
//! assert_eq!(parse_package_manager_hint("pnpm@9.1.0"), Some("pnpm"));
//! assert_eq!(parse_package_manager_hint("yarn"), Some("yarn"));
//! assert_eq!(parse_package_manager_hint("gradle@8"), None);
//! ```

use crate::discovery::manifest::PackageJson;
use crate::types::WorkspaceKind;
use std::path::Path;

/// Lockfiles and the client that writes them, most specific first.
const LOCKFILES: [(&str, &str); 5] = [
    ("pnpm-lock.yaml", "pnpm"),
    ("yarn.lock", "yarn"),
    ("bun.lockb", "bun"),
    ("bun.lock", "bun"),
    ("package-lock.json", "npm"),
];

/// Extract the client name from a `packageManager` value.
#[must_use]
pub fn parse_package_manager_hint(hint: &str) -> Option<&'static str> {
    let trimmed = hint.trim();
    let name = match trimmed.split_once('@') {
        Some((name, _)) if !name.is_empty() => name,
        _ => trimmed,
    };

    match name.trim().to_ascii_lowercase().as_str() {
        "npm" => Some("npm"),
        "pnpm" => Some("pnpm"),
        "yarn" => Some("yarn"),
        "bun" => Some("bun"),
        _ => None,
    }
}

/// The client whose lockfile is present in `root`, if any.
#[must_use]
pub fn detect_from_lockfile(root: &Path) -> Option<&'static str> {
    LOCKFILES
        .iter()
        .find(|(file, _)| root.join(file).is_file())
        .map(|(_, manager)| *manager)
}

/// Determine the package manager for a workspace root.
///
/// `manifest` is the root `package.json` when one was already parsed.
#[must_use]
pub fn detect_package_manager(
    root: &Path,
    manifest: Option<&PackageJson>,
    kind: WorkspaceKind,
) -> String {
    if let Some(manager) = manifest
        .and_then(|m| m.package_manager.as_deref())
        .and_then(parse_package_manager_hint)
    {
        tracing::debug!("Package manager {} declared in {}", manager, root.display());
        return manager.to_string();
    }

    if let Some(manager) = detect_from_lockfile(root) {
        tracing::debug!("Package manager {} detected from lockfile in {}", manager, root.display());
        return manager.to_string();
    }

    kind.default_package_manager().to_string()
}

/// Whether a `package.json` workspace root is managed by Yarn.
#[must_use]
pub fn is_yarn_root(root: &Path, manifest: &PackageJson) -> bool {
    manifest
        .package_manager
        .as_deref()
        .is_some_and(|hint| hint.trim_start().starts_with("yarn"))
        || root.join("yarn.lock").is_file()
}
