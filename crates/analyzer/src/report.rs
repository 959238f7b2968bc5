//! The merged analysis result.

use chrono::{DateTime, Utc};
use monodep_cycles::CycleAnalysis;
use monodep_recovery::ErrorStatistics;
use monodep_resolver::DependencyTree;
use monodep_workspaces::{SkippedFile, WorkspaceConfiguration, WorkspacePackage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What was left out of an analysis and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DegradationSummary {
    /// Manifests found but unusable.
    pub skipped_manifests: Vec<SkippedFile>,
    /// Workspace configuration files that could not be parsed.
    pub skipped_configurations: Vec<SkippedFile>,
    /// Dependencies whose subtree is missing from the tree.
    pub unresolved_subtrees: usize,
    /// Subtrees cut at the depth limit.
    pub truncated_subtrees: usize,
    /// Roots excluded because none of their dependencies resolved.
    pub failed_roots: usize,
    /// Recovery strategies applied while building the tree.
    pub recovery_actions: usize,
    /// Every error handled during the run.
    pub error_statistics: ErrorStatistics,
    /// Whether nothing was skipped or left unresolved.
    pub complete: bool,
}

/// Headline numbers of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Workspace configurations in effect.
    pub workspaces: usize,
    /// Workspace packages.
    pub packages: usize,
    /// Distinct `name@version` pairs in the tree.
    pub unique_dependencies: usize,
    /// Packages with more than one version in use.
    pub conflicts: usize,
    /// Conflicts with a recorded fix.
    pub auto_resolved_conflicts: usize,
    /// Circular dependencies between workspace packages.
    pub cycles: usize,
    /// 0 to 100.
    pub health_score: u8,
    /// See [`DegradationSummary::complete`].
    pub complete: bool,
}

/// Everything one analysis found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Repository root.
    pub root: PathBuf,
    /// When the analysis finished.
    pub generated_at: DateTime<Utc>,
    /// Wall time of the whole analysis.
    pub duration_ms: u64,
    /// Workspace configurations in effect.
    pub workspaces: Vec<WorkspaceConfiguration>,
    /// Workspace packages.
    pub packages: Vec<WorkspacePackage>,
    /// Resolved dependency tree with conflicts.
    pub tree: DependencyTree,
    /// Circular dependencies between workspace packages.
    pub cycles: CycleAnalysis,
    /// What is missing.
    pub degradation: DegradationSummary,
}

impl AnalysisReport {
    /// Headline numbers.
    #[must_use]
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            workspaces: self.workspaces.len(),
            packages: self.packages.len(),
            unique_dependencies: self.tree.metadata.unique_packages,
            conflicts: self.tree.conflicts.len(),
            auto_resolved_conflicts: self.tree.metadata.auto_resolved_conflicts,
            cycles: self.cycles.cycles.len(),
            health_score: self.cycles.health_score,
            complete: self.degradation.complete,
        }
    }
}

/// Result of a cycle-only check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCheck {
    /// Repository root.
    pub root: PathBuf,
    /// Workspace packages in the graph.
    pub packages: usize,
    /// Manifests found but unusable.
    pub skipped_manifests: Vec<SkippedFile>,
    /// Cycles and health score.
    pub cycles: CycleAnalysis,
}
