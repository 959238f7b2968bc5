//! The analysis pipeline: discovery, tree construction, cycle detection.

use crate::config::AnalyzerConfig;
use crate::report::{AnalysisReport, CycleCheck, DegradationSummary};
use crate::{Error, Result};
use chrono::Utc;
use monodep_cache::ResolutionCache;
use monodep_cycles::{CircularDetector, CycleAnalysis, PackageGraph};
use monodep_recovery::ErrorHandler;
use monodep_registry::{ExternalResolver, HttpRegistry, MockRegistry};
use monodep_resolver::{DependencyTree, DependencyTreeResolver, PackageNode};
use monodep_workspaces::{WorkspacePackage, WorkspaceParser};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cache namespace of resolved registry subtrees.
pub const NODE_CACHE_NAMESPACE: &str = "nodes";

/// Cache namespace of whole trees.
pub const TREE_CACHE_NAMESPACE: &str = "trees";

/// The two resolution caches of an analyzer.
#[derive(Debug, Clone)]
pub struct AnalyzerCaches {
    /// Registry subtrees by name and range.
    pub nodes: Arc<ResolutionCache<PackageNode>>,
    /// Whole trees by package set and options.
    pub trees: Arc<ResolutionCache<DependencyTree>>,
}

impl AnalyzerCaches {
    fn open(config: &AnalyzerConfig, handler: &Arc<ErrorHandler>) -> Self {
        Self {
            nodes: Arc::new(open_cache(config, NODE_CACHE_NAMESPACE, handler)),
            trees: Arc::new(open_cache(config, TREE_CACHE_NAMESPACE, handler)),
        }
    }

    fn flush(&self) {
        for (namespace, result) in [
            (NODE_CACHE_NAMESPACE, self.nodes.flush()),
            (TREE_CACHE_NAMESPACE, self.trees.flush()),
        ] {
            match result {
                Ok(written) => tracing::debug!(namespace, written, "Cache flushed"),
                Err(e) => tracing::warn!(namespace, "Failed to flush cache: {e}"),
            }
        }
    }
}

/// A disk-backed cache, or an in-memory one when the disk is unusable.
fn open_cache<T>(
    config: &AnalyzerConfig,
    namespace: &str,
    handler: &Arc<ErrorHandler>,
) -> ResolutionCache<T>
where
    T: Clone + serde::Serialize + serde::de::DeserializeOwned,
{
    let store = config.cache.store.clone();
    let cache = if store.persist {
        match ResolutionCache::open(store.clone(), namespace) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!(namespace, "Falling back to an in-memory cache: {e}");
                ResolutionCache::in_memory(store, namespace)
            }
        }
    } else {
        ResolutionCache::in_memory(store, namespace)
    };
    cache.with_error_handler(Arc::clone(handler))
}

/// The registry the configuration asks for.
///
/// # Errors
///
/// Fails when the fixture cannot be loaded or the HTTP client cannot be
/// built.
pub fn external_resolver(config: &AnalyzerConfig) -> Result<Arc<dyn ExternalResolver>> {
    if let Some(fixture) = &config.registry.fixture {
        tracing::info!("Using registry fixture {}", fixture.display());
        return Ok(Arc::new(MockRegistry::from_fixture_file(fixture)?));
    }
    Ok(Arc::new(HttpRegistry::new(config.registry.http.clone())?))
}

fn graph_analysis(config: &AnalyzerConfig, packages: &[WorkspacePackage]) -> CycleAnalysis {
    let graph = PackageGraph::from_packages(packages, config.health.include_dev_dependencies);
    CircularDetector::new(config.health.score).analyze(&graph)
}

/// Look for cycles between the workspace packages under `root` without
/// resolving anything external.
///
/// # Errors
///
/// Fails only when `root` does not exist.
#[tracing::instrument(skip(config), fields(root = %root.display()))]
pub fn check_cycles(config: &AnalyzerConfig, root: &Path) -> Result<CycleCheck> {
    let discovery = WorkspaceParser::new(config.discovery.clone()).discover_packages(root)?;
    let cycles = graph_analysis(config, &discovery.packages);
    tracing::info!(
        packages = discovery.packages.len(),
        cycles = cycles.cycles.len(),
        health_score = cycles.health_score,
        "Cycle check complete"
    );
    Ok(CycleCheck {
        root: root.to_path_buf(),
        packages: discovery.packages.len(),
        skipped_manifests: discovery.skipped_manifests,
        cycles,
    })
}

/// Runs whole-repository analyses.
pub struct Analyzer {
    config: AnalyzerConfig,
    error_handler: Arc<ErrorHandler>,
    resolver: DependencyTreeResolver,
    caches: Option<AnalyzerCaches>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .field("caches", &self.caches.is_some())
            .finish_non_exhaustive()
    }
}

impl Analyzer {
    /// An analyzer using the registry named by the configuration.
    ///
    /// # Errors
    ///
    /// See [`external_resolver`].
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let external = external_resolver(&config)?;
        Ok(Self::with_resolver(config, external))
    }

    /// An analyzer resolving external packages through `external`.
    #[must_use]
    pub fn with_resolver(config: AnalyzerConfig, external: Arc<dyn ExternalResolver>) -> Self {
        let error_handler = Arc::new(ErrorHandler::with_default_strategies(
            config.errors.history_limit,
        ));
        let caches = config
            .build
            .use_cache
            .then(|| AnalyzerCaches::open(&config, &error_handler));

        let mut resolver = DependencyTreeResolver::new(external, Arc::clone(&error_handler));
        if let Some(caches) = &caches {
            resolver = resolver
                .with_node_cache(Arc::clone(&caches.nodes))
                .with_tree_cache(Arc::clone(&caches.trees));
        }

        Self {
            config,
            error_handler,
            resolver,
            caches,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Handler every non-fatal error is reported to.
    #[must_use]
    pub const fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.error_handler
    }

    /// The caches, unless caching is disabled.
    #[must_use]
    pub const fn caches(&self) -> Option<&AnalyzerCaches> {
        self.caches.as_ref()
    }

    /// Run cache maintenance on the configured interval until `cancel`
    /// fires. Does nothing when caching is disabled.
    #[must_use]
    pub fn spawn_cache_maintenance(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let Some(caches) = &self.caches else {
            return Vec::new();
        };
        let interval = Duration::from_secs(self.config.cache.maintenance_interval_secs.max(1));
        vec![
            ResolutionCache::spawn_maintenance(Arc::clone(&caches.nodes), interval, cancel.clone()),
            ResolutionCache::spawn_maintenance(Arc::clone(&caches.trees), interval, cancel.clone()),
        ]
    }

    /// Analyze the repository at `root`.
    ///
    /// # Errors
    ///
    /// Fails only when `root` does not exist, when every root package fails
    /// to resolve, or when `cancel` fires. Everything else is reported in
    /// [`AnalysisReport::degradation`].
    #[tracing::instrument(skip(self, cancel), fields(root = %root.display()))]
    pub async fn analyze(&self, root: &Path, cancel: CancellationToken) -> Result<AnalysisReport> {
        let started = Instant::now();

        let parser = WorkspaceParser::new(self.config.discovery.clone())
            .with_error_handler(Arc::clone(&self.error_handler));
        let discovery_root = root.to_path_buf();
        let discovery = tokio::task::spawn_blocking(move || parser.discover_packages(&discovery_root))
            .await
            .map_err(|e| Error::TaskFailed {
                message: e.to_string(),
            })??;

        let tree = self
            .resolver
            .build_tree(&discovery.packages, &self.config.build, cancel)
            .await?;

        let cycles = graph_analysis(&self.config, &discovery.packages);

        if let Some(caches) = self.caches.clone()
            && let Err(e) = tokio::task::spawn_blocking(move || caches.flush()).await
        {
            tracing::warn!("Cache flush task failed: {e}");
        }

        let degradation = DegradationSummary {
            complete: discovery.is_complete() && tree.is_complete(),
            skipped_manifests: discovery.skipped_manifests,
            skipped_configurations: discovery.skipped_configurations,
            unresolved_subtrees: tree.metadata.unresolved_subtrees,
            truncated_subtrees: tree.metadata.truncated_subtrees,
            failed_roots: tree.metadata.failed_roots,
            recovery_actions: tree.metadata.recovery_actions,
            error_statistics: self.error_handler.statistics(),
        };

        let report = AnalysisReport {
            root: root.to_path_buf(),
            generated_at: Utc::now(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            workspaces: discovery.configurations,
            packages: discovery.packages,
            tree,
            cycles,
            degradation,
        };

        let summary = report.summary();
        tracing::info!(
            packages = summary.packages,
            conflicts = summary.conflicts,
            cycles = summary.cycles,
            health_score = summary.health_score,
            complete = summary.complete,
            duration_ms = report.duration_ms,
            "Analysis complete"
        );
        Ok(report)
    }
}
