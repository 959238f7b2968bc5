//! Analyzer configuration.
//!
//! Loaded from `--config`, or from `monodep.toml` at the repository root,
//! falling back to built-in defaults. Every section and every key is
//! optional.
//!
//! ```toml
//! [build]
//! max_depth = 6
//! concurrency_level = 16
//! package_timeout_ms = 10000
//! auto_resolve_conflicts = true
//!
//! [cache]
//! ttl_secs = 3600
//! persist = false
//!
//! [registry]
//! url = "https://registry.npmjs.org"
//! requests_per_second = 20
//!
//! [discovery]
//! ignored_dirs = ["node_modules", "vendor"]
//!
//! [health]
//! max_penalty = 80
//! include_dev_dependencies = false
//!
//! [errors]
//! history_limit = 500
//! ```

use crate::{Error, Result};
use monodep_cache::CacheConfig;
use monodep_cycles::HealthScoreConfig;
use monodep_registry::HttpRegistryConfig;
use monodep_resolver::BuildOptions;
use monodep_workspaces::DiscoveryOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the configuration file looked up at the repository root.
pub const CONFIG_FILE_NAME: &str = "monodep.toml";

/// Settings for the whole analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Tree construction.
    pub build: BuildOptions,
    /// Resolution caches.
    pub cache: CacheSettings,
    /// External registry.
    pub registry: RegistrySettings,
    /// Filesystem traversal.
    pub discovery: DiscoveryOptions,
    /// Cycle analysis and scoring.
    pub health: HealthSettings,
    /// Error handling.
    pub errors: ErrorSettings,
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Tier sizes, expiry and location.
    #[serde(flatten)]
    pub store: CacheConfig,
    /// Seconds between maintenance cycles of long-running processes.
    pub maintenance_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            store: CacheConfig::default(),
            maintenance_interval_secs: 300,
        }
    }
}

/// `[registry]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// HTTP client settings.
    #[serde(flatten)]
    pub http: HttpRegistryConfig,
    /// Answer from this JSON fixture instead of the network.
    pub fixture: Option<PathBuf>,
}

/// `[health]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Score constants.
    #[serde(flatten)]
    pub score: HealthScoreConfig,
    /// Count development dependencies as package graph edges.
    pub include_dev_dependencies: bool,
}

/// `[errors]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorSettings {
    /// Handled errors kept for statistics.
    pub history_limit: usize,
}

impl Default for ErrorSettings {
    fn default() -> Self {
        Self {
            history_limit: 1_000,
        }
    }
}

impl AnalyzerConfig {
    /// Parse a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] for invalid TOML or unknown value types.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|source| Error::ConfigParse { path: None, source })
    }

    /// Read and parse a configuration file.
    ///
    /// Relative paths in the file are taken relative to its directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigRead`] or [`Error::ConfigParse`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        if let Some(base) = path.parent() {
            config.anchor_paths(base);
        }
        Ok(config)
    }

    fn anchor_paths(&mut self, base: &Path) {
        for path in [
            self.registry.fixture.as_mut(),
            self.cache.store.directory.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// The configuration for a repository.
    ///
    /// An explicit path must exist. Without one, `<root>/monodep.toml` is
    /// used when present, the defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigMissing`] for a missing explicit file, or the
    /// errors of [`AnalyzerConfig::from_file`].
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(Error::ConfigMissing {
                    path: path.to_path_buf(),
                });
            }
            debug!("Loading configuration from {}", path.display());
            return Self::from_file(path);
        }

        let candidate = root.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            debug!("Loading configuration from {}", candidate.display());
            return Self::from_file(&candidate);
        }

        debug!("No {CONFIG_FILE_NAME} in {}, using defaults", root.display());
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(AnalyzerConfig::parse("").unwrap(), AnalyzerConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = AnalyzerConfig::parse(
            r#"
            [build]
            max_depth = 4
            package_timeout_ms = 2500

            [cache]
            persist = false
            maintenance_interval_secs = 60

            [registry]
            requests_per_second = 25
            fixture = "fixtures/registry.json"

            [health]
            max_penalty = 50
            include_dev_dependencies = true
            "#,
        )
        .unwrap();

        assert_eq!(config.build.max_depth, 4);
        assert_eq!(config.build.package_timeout, Duration::from_millis(2500));
        assert_eq!(config.build.concurrency_level, BuildOptions::default().concurrency_level);
        assert!(!config.cache.store.persist);
        assert_eq!(config.cache.store.ttl_secs, CacheConfig::default().ttl_secs);
        assert_eq!(config.cache.maintenance_interval_secs, 60);
        assert_eq!(config.registry.http.requests_per_second, 25);
        assert_eq!(config.registry.http.url, HttpRegistryConfig::default().url);
        assert_eq!(
            config.registry.fixture.as_deref(),
            Some(Path::new("fixtures/registry.json"))
        );
        assert_eq!(config.health.score.max_penalty, 50);
        assert!(config.health.include_dev_dependencies);
        assert_eq!(config.errors.history_limit, 1_000);
        assert_eq!(config.discovery, DiscoveryOptions::default());
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let err = AnalyzerConfig::parse("[build]\nmax_depth = \"deep\"\n").unwrap_err();
        assert!(matches!(err, Error::ConfigParse { path: None, .. }));
    }

    #[test]
    fn test_load_prefers_explicit_then_root_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            AnalyzerConfig::load(dir.path(), None).unwrap(),
            AnalyzerConfig::default()
        );

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[build]\nmax_depth = 3\n").unwrap();
        assert_eq!(AnalyzerConfig::load(dir.path(), None).unwrap().build.max_depth, 3);

        let explicit = dir.path().join("other.toml");
        std::fs::write(&explicit, "[build]\nmax_depth = 7\n").unwrap();
        assert_eq!(
            AnalyzerConfig::load(dir.path(), Some(&explicit))
                .unwrap()
                .build
                .max_depth,
            7
        );

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            AnalyzerConfig::load(dir.path(), Some(&missing)),
            Err(Error::ConfigMissing { .. })
        ));
    }

    #[test]
    fn test_relative_paths_follow_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[cache]\ndirectory = \"/var/cache/monodep\"\n\n[registry]\nfixture = \"fixtures/npm.json\"\n",
        )
        .unwrap();
        let config = AnalyzerConfig::from_file(&path).unwrap();
        assert_eq!(
            config.registry.fixture,
            Some(dir.path().join("fixtures/npm.json"))
        );
        assert_eq!(
            config.cache.store.directory.as_deref(),
            Some(Path::new("/var/cache/monodep"))
        );
    }

    #[test]
    fn test_parse_errors_name_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[build\n").unwrap();
        let err = AnalyzerConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }
}
