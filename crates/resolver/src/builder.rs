//! Concurrent dependency tree construction.
//!
//! One task per root package; every declared dependency is resolved in its
//! own task and joined into the parent's children map. Registry calls hold
//! a semaphore permit, so at most `concurrency_level` are in flight, but a
//! task never holds a permit while waiting for its children.

use crate::conflicts::{EnhancedConflict, ResolutionStrategy, detect_conflicts, resolution_options};
use crate::node::{DependencyKind, PackageNode, ResolutionSource};
use crate::options::BuildOptions;
use crate::tree::{DependencyTree, ResolutionFailure, TreeMetadata, flatten};
use crate::{Error, Result};
use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use monodep_cache::{InputHasher, MetricsSnapshot, ResolutionCache, package_key, tree_key};
use monodep_recovery::{ErrorContext, ErrorHandler, ErrorKind};
use monodep_registry::{ExternalResolver, PackageMetadata};
use monodep_versions::SemanticVersion;
use monodep_workspaces::WorkspacePackage;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const WORKSPACE_PROTOCOL: &str = "workspace:";

/// Digest over every package name, version and declared range.
///
/// Independent of input order. Used as the input hash of cache entries and
/// as part of the tree cache key.
#[must_use]
pub fn package_set_digest(packages: &[WorkspacePackage]) -> String {
    let mut sorted: Vec<&WorkspacePackage> = packages.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));

    let mut hasher = InputHasher::new();
    for package in sorted {
        hasher.update(&package.name).update(&package.version);
        for (section, deps) in [
            ("dependencies", &package.dependencies),
            ("devDependencies", &package.dev_dependencies),
            ("peerDependencies", &package.peer_dependencies),
        ] {
            hasher.update(section).update(deps.len().to_string());
            for (name, range) in deps {
                hasher.update(name).update(range);
            }
        }
    }
    hasher.finish()
}

/// A dependency to resolve.
#[derive(Debug, Clone)]
struct Request {
    name: String,
    range: String,
    depth: usize,
    parent: Option<String>,
}

/// A resolved node and whether its subtree is whole.
struct Resolved {
    node: PackageNode,
    complete: bool,
}

/// Why a registry lookup produced nothing.
enum LookupError {
    Cancelled,
    Failed { kind: ErrorKind, message: String },
}

enum CallError {
    Cancelled,
    Registry(monodep_registry::Error),
}

#[derive(Debug, Default)]
struct Counters {
    unresolved: AtomicUsize,
    truncated: AtomicUsize,
    recovery_actions: AtomicUsize,
}

/// Everything the tasks of one build share.
struct BuildContext {
    external: Arc<dyn ExternalResolver>,
    handler: Arc<ErrorHandler>,
    node_cache: Option<Arc<ResolutionCache<PackageNode>>>,
    workspace: HashMap<String, WorkspacePackage>,
    options: BuildOptions,
    input_hash: String,
    semaphore: Semaphore,
    cancel: CancellationToken,
    lookups: Mutex<HashMap<String, (SemanticVersion, PackageMetadata)>>,
    failures: Mutex<Vec<ResolutionFailure>>,
    counters: Counters,
}

impl BuildContext {
    fn node_cache(&self) -> Option<&ResolutionCache<PackageNode>> {
        self.options
            .use_cache
            .then_some(self.node_cache.as_deref())
            .flatten()
    }

    fn local_package(&self, name: &str, range: &str) -> Option<&WorkspacePackage> {
        let package = self.workspace.get(name)?;
        (self.options.prefer_workspace || range.starts_with(WORKSPACE_PROTOCOL)).then_some(package)
    }

    /// Dependencies a workspace package contributes at `depth`.
    ///
    /// Development dependencies are followed for roots only.
    fn declared(&self, package: &WorkspacePackage, depth: usize) -> Vec<(DependencyKind, String, String)> {
        let mut declared: Vec<(DependencyKind, String, String)> = package
            .dependencies
            .iter()
            .map(|(n, r)| (DependencyKind::Runtime, n.clone(), r.clone()))
            .collect();
        if depth == 0 && self.options.include_dev_dependencies {
            declared.extend(
                package
                    .dev_dependencies
                    .iter()
                    .map(|(n, r)| (DependencyKind::Dev, n.clone(), r.clone())),
            );
        }
        if self.options.include_peer_dependencies {
            declared.extend(
                package
                    .peer_dependencies
                    .iter()
                    .map(|(n, r)| (DependencyKind::Peer, n.clone(), r.clone())),
            );
        }
        declared
    }

    fn record_failure(&self, request: &Request, kind: ErrorKind, message: String) {
        self.counters.unresolved.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            package = %request.name,
            range = %request.range,
            depth = request.depth,
            "Leaving dependency unresolved: {message}"
        );
        self.failures.lock().push(ResolutionFailure {
            package: request.name.clone(),
            requested_range: request.range.clone(),
            parent: request.parent.clone(),
            depth: request.depth,
            kind,
            message,
        });
    }

    /// Run one registry call under the timeout, giving up on cancellation.
    async fn call<T>(
        &self,
        name: &str,
        call: impl Future<Output = monodep_registry::Result<T>>,
    ) -> std::result::Result<T, CallError> {
        let timeout = self.options.package_timeout;
        tokio::select! {
            () = self.cancel.cancelled() => Err(CallError::Cancelled),
            result = tokio::time::timeout(timeout, call) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(CallError::Registry(e)),
                Err(_) => Err(CallError::Registry(monodep_registry::Error::timeout(name, timeout))),
            },
        }
    }

    async fn lookup_once(
        &self,
        request: &Request,
    ) -> std::result::Result<(SemanticVersion, PackageMetadata), CallError> {
        let _permit = tokio::select! {
            () = self.cancel.cancelled() => return Err(CallError::Cancelled),
            permit = self.semaphore.acquire() => permit.map_err(|_| CallError::Cancelled)?,
        };
        let version = self
            .call(&request.name, self.external.resolve_version(&request.name, &request.range))
            .await?;
        let metadata = self
            .call(&request.name, self.external.get_metadata(&request.name, &version))
            .await?;
        Ok((version, metadata))
    }

    /// Resolve through the registry, retrying while recovery asks for it.
    async fn lookup(
        &self,
        request: &Request,
        key: &str,
    ) -> std::result::Result<(SemanticVersion, PackageMetadata), LookupError> {
        if let Some(found) = self.lookups.lock().get(key).cloned() {
            return Ok(found);
        }

        let mut attempt: u32 = 1;
        loop {
            match self.lookup_once(request).await {
                Ok(found) => {
                    self.lookups.lock().insert(key.to_string(), found.clone());
                    return Ok(found);
                }
                Err(CallError::Cancelled) => return Err(LookupError::Cancelled),
                Err(CallError::Registry(e)) => {
                    let record = self.handler.handle(
                        &e,
                        ErrorContext::new("resolve_dependency")
                            .with_package(&request.name)
                            .with_attempt(attempt)
                            .with_detail("range", &request.range)
                            .with_detail("depth", request.depth.to_string()),
                    );
                    if record.recovery.is_some() {
                        self.counters.recovery_actions.fetch_add(1, Ordering::Relaxed);
                    }
                    if record.should_retry() && attempt <= self.options.retry_attempts {
                        attempt += 1;
                        tracing::debug!(package = %request.name, attempt, "Retrying registry lookup");
                        continue;
                    }
                    return Err(LookupError::Failed {
                        kind: record.kind,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct ChildrenOutcome {
    attempted: usize,
    failed: usize,
    complete: bool,
}

enum ChildResult {
    Resolved { complete: bool },
    Failed,
}

/// Resolve `declared` as children of the node at `parent_depth`, writing
/// them into `parent`.
async fn resolve_children(
    ctx: &Arc<BuildContext>,
    parent: &mut PackageNode,
    declared: Vec<(DependencyKind, String, String)>,
) -> ChildrenOutcome {
    if declared.is_empty() {
        return ChildrenOutcome {
            complete: true,
            ..ChildrenOutcome::default()
        };
    }

    let depth = parent.depth + 1;
    if depth > ctx.options.max_depth {
        ctx.counters
            .truncated
            .fetch_add(declared.len(), Ordering::Relaxed);
        tracing::debug!(
            package = %parent.name,
            dropped = declared.len(),
            "Maximum depth reached"
        );
        return ChildrenOutcome::default();
    }

    let joined: Arc<Mutex<BTreeMap<(DependencyKind, String), PackageNode>>> =
        Arc::new(Mutex::new(BTreeMap::new()));
    let mut tasks = JoinSet::new();
    let attempted = declared.len();

    for (kind, name, range) in declared {
        let ctx = Arc::clone(ctx);
        let joined = Arc::clone(&joined);
        let request = Request {
            name,
            range,
            depth,
            parent: Some(parent.name.clone()),
        };
        tasks.spawn(async move {
            let name = request.name.clone();
            match resolve_dependency(ctx, request).await {
                Some(resolved) => {
                    joined.lock().insert((kind, name), resolved.node);
                    ChildResult::Resolved {
                        complete: resolved.complete,
                    }
                }
                None => ChildResult::Failed,
            }
        });
    }

    let mut outcome = ChildrenOutcome {
        attempted,
        failed: 0,
        complete: true,
    };
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(ChildResult::Resolved { complete }) => outcome.complete &= complete,
            Ok(ChildResult::Failed) => {
                outcome.failed += 1;
                outcome.complete = false;
            }
            Err(e) => {
                tracing::warn!(package = %parent.name, "Dependency task failed: {e}");
                ctx.counters.unresolved.fetch_add(1, Ordering::Relaxed);
                outcome.failed += 1;
                outcome.complete = false;
            }
        }
    }

    let children = std::mem::take(&mut *joined.lock());
    for ((kind, name), node) in children {
        parent.children_of_mut(kind).insert(name, node);
    }
    outcome
}

/// Resolve one dependency and its subtree. `None` means the dependency
/// failed (already recorded) or the build was cancelled.
fn resolve_dependency(ctx: Arc<BuildContext>, request: Request) -> BoxFuture<'static, Option<Resolved>> {
    async move {
        if ctx.cancel.is_cancelled() {
            return None;
        }

        if let Some(package) = ctx.local_package(&request.name, &request.range) {
            let declared = ctx.declared(package, request.depth);
            let mut node = PackageNode::leaf(
                &package.name,
                &package.version,
                &request.range,
                request.depth,
                ResolutionSource::Workspace,
            );
            let outcome = resolve_children(&ctx, &mut node, declared).await;
            return Some(Resolved {
                node,
                complete: outcome.complete,
            });
        }

        let key = package_key(&request.name, &request.range);
        if let Some(mut node) = ctx.node_cache().and_then(|cache| cache.get(&key)) {
            let truncated = node.rebase(request.depth, ctx.options.max_depth, ResolutionSource::Cache);
            if truncated > 0 {
                ctx.counters.truncated.fetch_add(truncated, Ordering::Relaxed);
            }
            tracing::debug!(package = %request.name, range = %request.range, "Resolved from cache");
            return Some(Resolved {
                node,
                complete: truncated == 0,
            });
        }

        let (version, metadata) = match ctx.lookup(&request, &key).await {
            Ok(found) => found,
            Err(LookupError::Cancelled) => return None,
            Err(LookupError::Failed { kind, message }) => {
                ctx.record_failure(&request, kind, message);
                return None;
            }
        };

        let mut node = PackageNode::leaf(
            &request.name,
            version.to_string(),
            &request.range,
            request.depth,
            ResolutionSource::Registry,
        );
        let declared = metadata
            .dependencies
            .into_iter()
            .map(|(name, range)| (DependencyKind::Runtime, name, range))
            .collect();
        let outcome = resolve_children(&ctx, &mut node, declared).await;

        // Only whole subtrees are cached, and nothing once cancelled.
        if outcome.complete
            && !ctx.cancel.is_cancelled()
            && let Some(cache) = ctx.node_cache()
        {
            cache.set(key, node.clone(), ctx.input_hash.clone());
        }

        tracing::debug!(package = %request.name, version = %node.version, depth = request.depth, "Resolved");
        Some(Resolved {
            node,
            complete: outcome.complete,
        })
    }
    .boxed()
}

/// A root node, with the reason it counts as failed when none of its
/// declared dependencies resolved.
enum RootOutcome {
    Resolved {
        node: PackageNode,
        failure: Option<String>,
    },
    Cancelled,
}

async fn resolve_root(ctx: Arc<BuildContext>, package: WorkspacePackage) -> RootOutcome {
    if ctx.cancel.is_cancelled() {
        return RootOutcome::Cancelled;
    }
    let declared = ctx.declared(&package, 0);
    let mut node = PackageNode::leaf(
        &package.name,
        &package.version,
        &package.version,
        0,
        ResolutionSource::Workspace,
    );
    let outcome = resolve_children(&ctx, &mut node, declared).await;
    if ctx.cancel.is_cancelled() {
        return RootOutcome::Cancelled;
    }

    let failure = (outcome.attempted > 0 && outcome.failed == outcome.attempted).then(|| {
        format!(
            "none of the {} dependencies of {} resolved",
            outcome.attempted, package.name
        )
    });
    if let Some(reason) = &failure {
        tracing::warn!(package = %package.name, "{reason}");
    }
    RootOutcome::Resolved { node, failure }
}

/// Builds dependency trees for sets of workspace packages.
pub struct DependencyTreeResolver {
    external: Arc<dyn ExternalResolver>,
    error_handler: Arc<ErrorHandler>,
    node_cache: Option<Arc<ResolutionCache<PackageNode>>>,
    tree_cache: Option<Arc<ResolutionCache<DependencyTree>>>,
}

impl std::fmt::Debug for DependencyTreeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyTreeResolver")
            .field("node_cache", &self.node_cache.is_some())
            .field("tree_cache", &self.tree_cache.is_some())
            .finish_non_exhaustive()
    }
}

impl DependencyTreeResolver {
    /// A resolver using `external` for everything outside the repository.
    #[must_use]
    pub fn new(external: Arc<dyn ExternalResolver>, error_handler: Arc<ErrorHandler>) -> Self {
        Self {
            external,
            error_handler,
            node_cache: None,
            tree_cache: None,
        }
    }

    /// Cache resolved registry nodes by name and range.
    #[must_use]
    pub fn with_node_cache(mut self, cache: Arc<ResolutionCache<PackageNode>>) -> Self {
        self.node_cache = Some(cache);
        self
    }

    /// Cache whole trees by package set and options.
    #[must_use]
    pub fn with_tree_cache(mut self, cache: Arc<ResolutionCache<DependencyTree>>) -> Self {
        self.tree_cache = Some(cache);
        self
    }

    /// The handler failures are reported to.
    #[must_use]
    pub const fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.error_handler
    }

    /// Build the dependency tree of `packages`.
    ///
    /// Failed dependencies are left out of the tree and listed in
    /// [`DependencyTree::failures`].
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] when `cancel` fires, [`Error::AllRootsFailed`]
    /// when no root resolved any of its dependencies.
    #[tracing::instrument(skip_all, fields(packages = packages.len()))]
    pub async fn build_tree(
        &self,
        packages: &[WorkspacePackage],
        options: &BuildOptions,
        cancel: CancellationToken,
    ) -> Result<DependencyTree> {
        let started = Instant::now();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let input_hash = package_set_digest(packages);
        let tree_cache = self.tree_cache.as_ref().filter(|_| options.use_cache);
        let tree_cache_key = match tree_cache {
            Some(_) => Some(tree_key(packages.len(), options, &input_hash)?),
            None => None,
        };

        if let (Some(cache), Some(key)) = (tree_cache, &tree_cache_key)
            && let Some(mut tree) = cache.get(key)
        {
            tree.metadata.from_cache = true;
            tree.metadata.duration_ms = elapsed_ms(started);
            tracing::info!(nodes = tree.metadata.total_nodes, "Dependency tree served from cache");
            return Ok(tree);
        }

        let ctx = Arc::new(BuildContext {
            external: Arc::clone(&self.external),
            handler: Arc::clone(&self.error_handler),
            node_cache: self.node_cache.clone(),
            workspace: packages
                .iter()
                .map(|p| (p.name.clone(), p.clone()))
                .collect(),
            options: options.clone(),
            input_hash: input_hash.clone(),
            semaphore: Semaphore::new(options.concurrency_level.max(1)),
            cancel: cancel.clone(),
            lookups: Mutex::new(HashMap::new()),
            failures: Mutex::new(Vec::new()),
            counters: Counters::default(),
        });

        let mut tasks = JoinSet::new();
        for (index, package) in packages.iter().enumerate() {
            let ctx = Arc::clone(&ctx);
            let package = package.clone();
            tasks.spawn(async move { (index, resolve_root(ctx, package).await) });
        }

        let mut roots: Vec<(usize, PackageNode)> = Vec::new();
        let mut failed_roots: Vec<String> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, RootOutcome::Resolved { node, failure })) => {
                    failed_roots.extend(failure);
                    roots.push((index, node));
                }
                Ok((_, RootOutcome::Cancelled)) => {}
                Err(e) => failed_roots.push(format!("root task failed: {e}")),
            }
        }

        if cancel.is_cancelled() {
            tracing::info!("Dependency tree build cancelled");
            return Err(Error::Cancelled);
        }
        if !packages.is_empty() && failed_roots.len() == packages.len() {
            failed_roots.sort();
            failed_roots.truncate(3);
            return Err(Error::AllRootsFailed {
                count: packages.len(),
                reasons: failed_roots,
            });
        }

        roots.sort_by_key(|(index, _)| *index);
        let root_packages: Vec<PackageNode> = roots.into_iter().map(|(_, node)| node).collect();
        let all_packages = flatten(&root_packages);

        let mut conflicts = Vec::new();
        let mut auto_resolved = 0;
        for (conflict, affected) in detect_conflicts(&all_packages, options.conflict_threshold) {
            let mut options_for_conflict = resolution_options(&conflict);
            for option in &mut options_for_conflict {
                let unobserved = !conflict.versions.contains(&option.target);
                if option.strategy == ResolutionStrategy::AdoptSuggested
                    && unobserved
                    && !ctx.workspace.contains_key(&conflict.package_name)
                    && let Ok(published) = ctx
                        .call(
                            &conflict.package_name,
                            async { Ok(self.external.exists(&conflict.package_name, &option.target).await) },
                        )
                        .await
                {
                    option.set_published(published);
                }
            }
            let mut enhanced = EnhancedConflict::new(conflict, options_for_conflict, affected);
            if options.auto_resolve_conflicts && enhanced.auto_resolve() {
                auto_resolved += 1;
            }
            conflicts.push(enhanced);
        }

        let mut failures = std::mem::take(&mut *ctx.failures.lock());
        failures.sort_by(|a, b| {
            (a.depth, &a.package, &a.parent, &a.requested_range)
                .cmp(&(b.depth, &b.package, &b.parent, &b.requested_range))
        });

        let mut total_nodes = 0;
        let mut workspace_nodes = 0;
        for root in &root_packages {
            root.visit(None, &mut |node, _| {
                total_nodes += 1;
                if node.is_workspace {
                    workspace_nodes += 1;
                }
            });
        }

        let cache_metrics = self.node_cache.as_ref().map(|c| c.metrics().snapshot());
        let metadata = TreeMetadata {
            total_nodes,
            unique_packages: all_packages.len(),
            external_packages: total_nodes - workspace_nodes,
            workspace_packages: workspace_nodes,
            max_depth: root_packages.iter().map(PackageNode::max_depth).max().unwrap_or(0),
            conflict_count: conflicts.len(),
            auto_resolved_conflicts: auto_resolved,
            cache_hit_rate: cache_metrics.as_ref().map_or(0.0, MetricsSnapshot::hit_rate),
            hot_cache_hit_rate: cache_metrics.as_ref().map_or(0.0, MetricsSnapshot::hot_hit_rate),
            unresolved_subtrees: ctx.counters.unresolved.load(Ordering::Relaxed),
            truncated_subtrees: ctx.counters.truncated.load(Ordering::Relaxed),
            failed_roots: failed_roots.len(),
            recovery_actions: ctx.counters.recovery_actions.load(Ordering::Relaxed),
            from_cache: false,
            input_hash,
            duration_ms: elapsed_ms(started),
            built_at: Utc::now(),
        };

        let tree = DependencyTree {
            root_packages,
            all_packages,
            conflicts,
            failures,
            metadata,
        };

        if let (Some(cache), Some(key)) = (tree_cache, tree_cache_key)
            && tree.is_complete()
        {
            cache.set(key, tree.clone(), tree.metadata.input_hash.clone());
        }

        tracing::info!(
            nodes = tree.metadata.total_nodes,
            unique = tree.metadata.unique_packages,
            conflicts = tree.metadata.conflict_count,
            unresolved = tree.metadata.unresolved_subtrees,
            truncated = tree.metadata.truncated_subtrees,
            duration_ms = tree.metadata.duration_ms,
            "Dependency tree built"
        );
        Ok(tree)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
