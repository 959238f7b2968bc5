//! The workspace parser: configurations in, packages out.

use crate::discovery::configs::{ConfigurationScan, discover_configurations};
use crate::discovery::manifest::PackageJson;
use crate::discovery::resolve_glob_patterns;
use crate::error::{Error, Result};
use crate::types::{DiscoveryOptions, DiscoveryReport, SkippedFile, WorkspaceConfiguration, WorkspacePackage};
use monodep_recovery::{ErrorContext, ErrorHandler};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const PACKAGE_JSON: &str = "package.json";

/// Packages found for one configuration, before deduplication.
struct ConfigurationPackages {
    packages: Vec<WorkspacePackage>,
    skipped: Vec<(Error, SkippedFile)>,
}

/// Discovers workspace configurations and the packages they declare.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceParser {
    options: DiscoveryOptions,
    error_handler: Option<Arc<ErrorHandler>>,
}

impl WorkspaceParser {
    /// Create a parser with the given traversal options.
    #[must_use]
    pub fn new(options: DiscoveryOptions) -> Self {
        Self {
            options,
            error_handler: None,
        }
    }

    /// Forward non-fatal problems to `handler`.
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<ErrorHandler>) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Traversal options in use.
    #[must_use]
    pub const fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Discover the workspace configurations under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkspaceNotFound`] if `root` does not exist.
    #[tracing::instrument(skip(self, root), fields(root = %root.display()))]
    pub fn discover_configurations(&self, root: &Path) -> Result<ConfigurationScan> {
        let scan = discover_configurations(root, &self.options)?;
        if let Some(handler) = &self.error_handler {
            for error in &scan.superseded {
                handler.handle(error, ErrorContext::new("discover_configurations").with_path(root));
            }
        }
        tracing::info!(
            configurations = scan.configurations.len(),
            skipped = scan.skipped.len(),
            "Workspace configurations discovered"
        );
        Ok(scan)
    }

    /// Discover every package declared under `root`.
    ///
    /// Each configuration is expanded on the rayon pool. Packages are
    /// deduplicated by manifest path, the first configuration in priority
    /// order wins. When no configuration exists the root `package.json`, if
    /// any, forms a single-package workspace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkspaceNotFound`] if `root` does not exist. Broken
    /// manifests and configurations are reported, not returned as errors.
    #[tracing::instrument(skip(self, root), fields(root = %root.display()))]
    pub fn discover_packages(&self, root: &Path) -> Result<DiscoveryReport> {
        let scan = self.discover_configurations(root)?;

        let mut report = DiscoveryReport {
            skipped_configurations: scan.skipped,
            ..DiscoveryReport::default()
        };

        let per_config: Vec<ConfigurationPackages> = if scan.configurations.is_empty() {
            vec![Self::single_package(root)]
        } else {
            scan.configurations
                .par_iter()
                .map(|config| self.packages_for(config))
                .collect()
        };

        let mut seen: HashSet<PathBuf> = HashSet::new();
        for found in per_config {
            for package in found.packages {
                if seen.insert(package.manifest_path.clone()) {
                    report.packages.push(package);
                } else {
                    tracing::debug!(
                        "Package {} already declared by an earlier configuration",
                        package.manifest_path.display()
                    );
                }
            }
            for (error, skipped) in found.skipped {
                if let Some(handler) = &self.error_handler {
                    handler.handle(
                        &error,
                        ErrorContext::new("parse_manifest").with_path(&skipped.path),
                    );
                }
                report.skipped_manifests.push(skipped);
            }
        }
        report.configurations = scan.configurations;

        tracing::info!(
            packages = report.packages.len(),
            skipped_manifests = report.skipped_manifests.len(),
            "Workspace packages discovered"
        );
        Ok(report)
    }

    fn packages_for(&self, config: &WorkspaceConfiguration) -> ConfigurationPackages {
        let mut found = ConfigurationPackages {
            packages: Vec::new(),
            skipped: Vec::new(),
        };

        let dirs = match resolve_glob_patterns(&config.root_path, &config.packages, &self.options) {
            Ok(dirs) => dirs,
            Err(e) => {
                let skipped = SkippedFile {
                    path: config.config_path.clone(),
                    reason: e.to_string(),
                };
                found.skipped.push((e, skipped));
                return found;
            }
        };

        for dir in dirs {
            let manifest_path = dir.join(PACKAGE_JSON);
            if !manifest_path.is_file() {
                continue;
            }
            match PackageJson::read(&manifest_path)
                .and_then(|m| m.into_package(&manifest_path, &config.root_path))
            {
                Ok(package) => found.packages.push(package),
                Err(e) => {
                    tracing::warn!("Skipping manifest: {e}");
                    let skipped = SkippedFile {
                        path: manifest_path,
                        reason: e.to_string(),
                    };
                    found.skipped.push((e, skipped));
                }
            }
        }

        found.packages.sort_by(|a, b| a.manifest_path.cmp(&b.manifest_path));
        found
    }

    fn single_package(root: &Path) -> ConfigurationPackages {
        let manifest_path = root.join(PACKAGE_JSON);
        let mut found = ConfigurationPackages {
            packages: Vec::new(),
            skipped: Vec::new(),
        };
        if !manifest_path.is_file() {
            tracing::debug!("No workspace configuration or package.json in {}", root.display());
            return found;
        }

        match PackageJson::read(&manifest_path).and_then(|m| m.into_package(&manifest_path, root)) {
            Ok(package) => found.packages.push(package),
            Err(e) => {
                let skipped = SkippedFile {
                    path: manifest_path,
                    reason: e.to_string(),
                };
                found.skipped.push((e, skipped));
            }
        }
        found
    }
}
