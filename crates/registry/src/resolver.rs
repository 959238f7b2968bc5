//! The capability the dependency tree builder needs from a registry.

use crate::{Error, Result};
use async_trait::async_trait;
use monodep_versions::{SemanticVersion, VersionRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a registry knows about one published version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Package name.
    pub name: String,
    /// Exact published version.
    pub version: String,
    /// Runtime dependencies, name to range.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Peer dependencies, name to range.
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
    /// Optional dependencies, name to range.
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,
    /// Deprecation notice, if the version is deprecated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

/// Resolves package versions and metadata against an external registry.
///
/// Implementations must be safe to call from many tasks at once.
#[async_trait]
pub trait ExternalResolver: Send + Sync {
    /// The highest published version of `name` matching `range`.
    async fn resolve_version(&self, name: &str, range: &str) -> Result<SemanticVersion>;

    /// Metadata of one exact version.
    async fn get_metadata(&self, name: &str, version: &SemanticVersion) -> Result<PackageMetadata>;

    /// Whether `name@version` is published. Lookup failures read as `false`.
    async fn exists(&self, name: &str, version: &SemanticVersion) -> bool;

    /// Every published version of `name`, ascending.
    async fn list_versions(&self, name: &str) -> Result<Vec<SemanticVersion>>;
}

/// Whether `range` asks for the newest release rather than a bound.
#[must_use]
pub fn is_latest_range(range: &str) -> bool {
    matches!(range.trim(), "" | "*" | "latest" | "x" | "X")
}

/// Pick the version `range` resolves to from `available`.
///
/// `latest`, `*` and empty ranges resolve to `latest` when given, otherwise
/// to the highest stable version. Prereleases only match ranges whose own
/// version is a prerelease.
///
/// # Errors
///
/// [`Error::Version`] when `range` does not parse,
/// [`Error::PackageNotFound`] when nothing is published and
/// [`Error::VersionNotFound`] when nothing matches.
pub fn select_version(
    name: &str,
    range: &str,
    available: &[SemanticVersion],
    latest: Option<&SemanticVersion>,
) -> Result<SemanticVersion> {
    if available.is_empty() {
        return Err(Error::package_not_found(name));
    }

    if is_latest_range(range) {
        if let Some(latest) = latest {
            return Ok(latest.clone());
        }
        return available
            .iter()
            .filter(|v| !v.is_prerelease())
            .max()
            .cloned()
            .ok_or_else(|| Error::version_not_found(name, range));
    }

    let parsed = VersionRange::parse(range)?;
    let allow_prerelease = parsed.version.is_prerelease();
    available
        .iter()
        .filter(|v| allow_prerelease || !v.is_prerelease())
        .filter(|v| parsed.satisfies(v))
        .max()
        .cloned()
        .ok_or_else(|| Error::version_not_found(name, range))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(list: &[&str]) -> Vec<SemanticVersion> {
        list.iter().map(|v| SemanticVersion::parse(v).unwrap()).collect()
    }

    #[test]
    fn test_highest_match_wins() {
        let available = versions(&["1.0.0", "1.2.0", "1.9.3", "2.0.0"]);
        let picked = select_version("a", "^1.0.0", &available, None).unwrap();
        assert_eq!(picked.to_string(), "1.9.3");

        let picked = select_version("a", "~1.2.0", &available, None).unwrap();
        assert_eq!(picked.to_string(), "1.2.0");
    }

    #[test]
    fn test_prereleases_need_prerelease_range() {
        let available = versions(&["1.0.0", "1.1.0-beta.1"]);
        let picked = select_version("a", ">=1.0.0", &available, None).unwrap();
        assert_eq!(picked.to_string(), "1.0.0");

        let picked = select_version("a", ">=1.1.0-beta.0", &available, None).unwrap();
        assert_eq!(picked.to_string(), "1.1.0-beta.1");
    }

    #[test]
    fn test_latest_prefers_dist_tag() {
        let available = versions(&["1.0.0", "2.0.0", "3.0.0-rc.1"]);
        let tagged = SemanticVersion::parse("1.0.0").unwrap();
        assert_eq!(
            select_version("a", "latest", &available, Some(&tagged)).unwrap(),
            tagged
        );
        assert_eq!(
            select_version("a", "*", &available, None).unwrap().to_string(),
            "2.0.0"
        );
    }

    #[test]
    fn test_not_found_errors() {
        assert!(matches!(
            select_version("a", "^1.0.0", &[], None),
            Err(Error::PackageNotFound { .. })
        ));
        assert!(matches!(
            select_version("a", "^5.0.0", &versions(&["1.0.0"]), None),
            Err(Error::VersionNotFound { .. })
        ));
        assert!(matches!(
            select_version("a", "workspace:*", &versions(&["1.0.0"]), None),
            Err(Error::Version(_))
        ));
    }
}
