//! In-memory registry for tests and offline analysis.
//!
//! Fixtures can be built in code or loaded from JSON:
//!
//! ```json
//! {
//!   "latency_ms": 0,
//!   "packages": {
//!     "react": {
//!       "latest": "18.2.0",
//!       "versions": {
//!         "18.2.0": { "dependencies": { "loose-envify": "^1.1.0" } }
//!       }
//!     }
//!   },
//!   "failures": { "flaky": { "kind": "flaky", "remaining": 1 } }
//! }
//! ```

use crate::resolver::{ExternalResolver, PackageMetadata, select_version};
use crate::{Error, Result};
use async_trait::async_trait;
use monodep_versions::SemanticVersion;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One published version in a fixture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionFixture {
    /// Runtime dependencies.
    pub dependencies: BTreeMap<String, String>,
    /// Peer dependencies.
    pub peer_dependencies: BTreeMap<String, String>,
    /// Optional dependencies.
    pub optional_dependencies: BTreeMap<String, String>,
    /// Deprecation notice.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<String>,
}

/// All published versions of one package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageFixture {
    /// The `latest` dist-tag, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    /// Versions by exact version string.
    pub versions: BTreeMap<String, VersionFixture>,
}

/// A failure injected for one package name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MockFailure {
    /// Every call fails with a network error.
    Network,
    /// Every call fails with a timeout error.
    Timeout,
    /// Every call reports the package as missing.
    NotFound,
    /// Calls never complete.
    Hang,
    /// The next `remaining` calls fail with a network error, later ones
    /// succeed.
    Flaky {
        /// Failures left before calls succeed.
        remaining: u32,
    },
}

/// Serialized form of a whole mock registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryFixture {
    /// Packages by name.
    pub packages: BTreeMap<String, PackageFixture>,
    /// Injected failures by package name.
    pub failures: BTreeMap<String, MockFailure>,
    /// Delay added to every call, in milliseconds.
    pub latency_ms: u64,
}

/// Number of calls made per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallCounts {
    /// `resolve_version` calls.
    pub resolve_version: u64,
    /// `get_metadata` calls.
    pub get_metadata: u64,
    /// `exists` calls.
    pub exists: u64,
    /// `list_versions` calls.
    pub list_versions: u64,
}

impl CallCounts {
    /// Calls of every kind.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.resolve_version + self.get_metadata + self.exists + self.list_versions
    }
}

#[derive(Debug, Default)]
struct Counters {
    resolve_version: AtomicU64,
    get_metadata: AtomicU64,
    exists: AtomicU64,
    list_versions: AtomicU64,
}

/// [`ExternalResolver`] answering from in-memory fixtures.
#[derive(Debug, Default)]
pub struct MockRegistry {
    packages: RwLock<BTreeMap<String, PackageFixture>>,
    failures: RwLock<HashMap<String, MockFailure>>,
    latency: RwLock<Option<Duration>>,
    counters: Counters,
}

impl MockRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry populated from a fixture.
    #[must_use]
    pub fn from_fixture(fixture: RegistryFixture) -> Self {
        let latency = (fixture.latency_ms > 0).then(|| Duration::from_millis(fixture.latency_ms));
        Self {
            packages: RwLock::new(fixture.packages),
            failures: RwLock::new(fixture.failures.into_iter().collect()),
            latency: RwLock::new(latency),
            counters: Counters::default(),
        }
    }

    /// Load a JSON fixture file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Fixture`] if the file cannot be read and
    /// [`Error::InvalidDocument`] if it is not a valid fixture.
    pub fn from_fixture_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Fixture {
            path: path.to_path_buf(),
            source,
        })?;
        let fixture: RegistryFixture =
            serde_json::from_str(&content).map_err(|e| Error::InvalidDocument {
                name: path.display().to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(
            packages = fixture.packages.len(),
            "Loaded registry fixture from {}",
            path.display()
        );
        Ok(Self::from_fixture(fixture))
    }

    /// Builder form of [`MockRegistry::add_version`].
    #[must_use]
    pub fn with_version(self, name: &str, version: &str, dependencies: &[(&str, &str)]) -> Self {
        self.add_version(name, version, dependencies);
        self
    }

    /// Publish `name@version` with the given runtime dependencies.
    pub fn add_version(&self, name: &str, version: &str, dependencies: &[(&str, &str)]) {
        let fixture = VersionFixture {
            dependencies: dependencies
                .iter()
                .map(|(n, r)| ((*n).to_string(), (*r).to_string()))
                .collect(),
            ..VersionFixture::default()
        };
        self.add_version_fixture(name, version, fixture);
    }

    /// Publish `name@version` with full metadata.
    pub fn add_version_fixture(&self, name: &str, version: &str, fixture: VersionFixture) {
        self.packages
            .write()
            .entry(name.to_string())
            .or_default()
            .versions
            .insert(version.to_string(), fixture);
    }

    /// Point the `latest` dist-tag of `name` at `version`.
    pub fn set_latest(&self, name: &str, version: &str) {
        self.packages
            .write()
            .entry(name.to_string())
            .or_default()
            .latest = Some(version.to_string());
    }

    /// Make calls for `name` fail.
    pub fn fail(&self, name: &str, failure: MockFailure) {
        self.failures.write().insert(name.to_string(), failure);
    }

    /// Remove an injected failure.
    pub fn clear_failure(&self, name: &str) {
        self.failures.write().remove(name);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Calls made so far.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            resolve_version: self.counters.resolve_version.load(Ordering::Relaxed),
            get_metadata: self.counters.get_metadata.load(Ordering::Relaxed),
            exists: self.counters.exists.load(Ordering::Relaxed),
            list_versions: self.counters.list_versions.load(Ordering::Relaxed),
        }
    }

    async fn before_call(&self, counter: &AtomicU64, name: &str) -> Result<()> {
        counter.fetch_add(1, Ordering::Relaxed);

        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failure = {
            let mut failures = self.failures.write();
            match failures.get_mut(name) {
                Some(MockFailure::Flaky { remaining }) if *remaining > 0 => {
                    *remaining -= 1;
                    Some(MockFailure::Network)
                }
                Some(MockFailure::Flaky { .. }) | None => None,
                Some(failure) => Some(*failure),
            }
        };

        match failure {
            None | Some(MockFailure::Flaky { .. }) => Ok(()),
            Some(MockFailure::Network) => Err(Error::network(name, "connection reset by mock")),
            Some(MockFailure::Timeout) => Err(Error::timeout(name, Duration::ZERO)),
            Some(MockFailure::NotFound) => Err(Error::package_not_found(name)),
            Some(MockFailure::Hang) => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    fn package(&self, name: &str) -> Result<PackageFixture> {
        self.packages
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::package_not_found(name))
    }
}

fn sorted_versions(package: &PackageFixture) -> Vec<SemanticVersion> {
    let mut versions: Vec<SemanticVersion> = package
        .versions
        .keys()
        .filter_map(|v| SemanticVersion::parse(v).ok())
        .collect();
    versions.sort();
    versions
}

fn find_version<'a>(
    package: &'a PackageFixture,
    version: &SemanticVersion,
) -> Option<&'a VersionFixture> {
    package
        .versions
        .iter()
        .find(|(raw, _)| SemanticVersion::parse(raw).is_ok_and(|v| &v == version))
        .map(|(_, fixture)| fixture)
}

#[async_trait]
impl ExternalResolver for MockRegistry {
    async fn resolve_version(&self, name: &str, range: &str) -> Result<SemanticVersion> {
        self.before_call(&self.counters.resolve_version, name).await?;
        let package = self.package(name)?;
        let latest = package
            .latest
            .as_deref()
            .and_then(|v| SemanticVersion::parse(v).ok());
        select_version(name, range, &sorted_versions(&package), latest.as_ref())
    }

    async fn get_metadata(&self, name: &str, version: &SemanticVersion) -> Result<PackageMetadata> {
        self.before_call(&self.counters.get_metadata, name).await?;
        let package = self.package(name)?;
        let fixture = find_version(&package, version)
            .ok_or_else(|| Error::version_not_found(name, version.to_string()))?;
        Ok(PackageMetadata {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: fixture.dependencies.clone(),
            peer_dependencies: fixture.peer_dependencies.clone(),
            optional_dependencies: fixture.optional_dependencies.clone(),
            deprecated: fixture.deprecated.clone(),
        })
    }

    async fn exists(&self, name: &str, version: &SemanticVersion) -> bool {
        if self.before_call(&self.counters.exists, name).await.is_err() {
            return false;
        }
        self.package(name)
            .is_ok_and(|package| find_version(&package, version).is_some())
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<SemanticVersion>> {
        self.before_call(&self.counters.list_versions, name).await?;
        Ok(sorted_versions(&self.package(name)?))
    }
}
