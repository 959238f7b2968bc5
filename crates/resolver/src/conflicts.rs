//! Conflict detection over the flattened index, and resolution options.

use crate::tree::PackageEntry;
use monodep_versions::{
    ConflictType, ResolutionSuggestion, RiskLevel, SemanticVersion, VersionConflict, VersionRange,
    classify_conflict,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How a conflict could be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Move everything to the version satisfying every range.
    AdoptSuggested,
    /// Move everything to the newest observed version.
    AdoptLatest,
    /// Move everything to the oldest observed version.
    AdoptOldest,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AdoptSuggested => "adopt suggested",
            Self::AdoptLatest => "adopt latest",
            Self::AdoptOldest => "adopt oldest",
        })
    }
}

/// One package copy moving to the target version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChange {
    /// Version in use today.
    pub from: SemanticVersion,
    /// Version after the fix.
    pub to: SemanticVersion,
    /// Distance between the two.
    pub distance: ConflictType,
    /// Whether `to` is newer than `from`.
    pub upgrade: bool,
    /// Risk of this single move.
    pub risk: RiskLevel,
}

/// A candidate fix for a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOption {
    /// Which rule picked the target.
    pub strategy: ResolutionStrategy,
    /// Version every copy would move to.
    pub target: SemanticVersion,
    /// Overall risk of applying the option.
    pub risk: RiskLevel,
    /// Whether the target satisfies every parsable requested range.
    pub satisfies_all_ranges: bool,
    /// Whether the registry publishes the target; unset when not checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    /// Moves the option implies.
    pub changes: Vec<VersionChange>,
    /// One-line summary.
    pub description: String,
}

impl ResolutionOption {
    /// Record whether the target is published, raising the risk when not.
    pub fn set_published(&mut self, published: bool) {
        self.published = Some(published);
        if !published {
            self.risk = self.risk.escalate();
            self.description.push_str(" (target version is not published)");
        }
    }
}

/// A version conflict with resolution options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancedConflict {
    /// The underlying analysis.
    #[serde(flatten)]
    pub conflict: VersionConflict,
    /// Candidate fixes, suggested first when present.
    pub resolution_options: Vec<ResolutionOption>,
    /// Whether the lowest-risk option is low risk.
    pub auto_resolvable: bool,
    /// Packages depending on any conflicting version.
    pub affected_packages: Vec<String>,
    /// The option applied by auto-resolution, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_resolution: Option<ResolutionOption>,
}

impl EnhancedConflict {
    /// Wrap a conflict with its options.
    #[must_use]
    pub fn new(
        conflict: VersionConflict,
        resolution_options: Vec<ResolutionOption>,
        affected_packages: Vec<String>,
    ) -> Self {
        let mut enhanced = Self {
            conflict,
            resolution_options,
            auto_resolvable: false,
            affected_packages,
            applied_resolution: None,
        };
        enhanced.auto_resolvable = enhanced
            .best_option()
            .is_some_and(|o| o.risk == RiskLevel::Low);
        enhanced
    }

    /// The lowest-risk option; earlier options win ties.
    #[must_use]
    pub fn best_option(&self) -> Option<&ResolutionOption> {
        self.resolution_options
            .iter()
            .enumerate()
            .min_by_key(|(index, option)| (option.risk, *index))
            .map(|(_, option)| option)
    }

    /// Apply the best option when the conflict is auto-resolvable.
    ///
    /// Returns whether a resolution was applied.
    pub fn auto_resolve(&mut self) -> bool {
        if !self.auto_resolvable || self.applied_resolution.is_some() {
            return false;
        }
        self.applied_resolution = self.best_option().cloned();
        self.applied_resolution.is_some()
    }

    /// Name of the conflicting package.
    #[must_use]
    pub fn package_name(&self) -> &str {
        &self.conflict.package_name
    }
}

/// Group the index by package name and analyze every name with at least
/// `threshold` distinct versions.
///
/// Thresholds below two are treated as two. Returns each conflict with the
/// sorted names of the packages depending on it.
#[must_use]
pub fn detect_conflicts(
    index: &BTreeMap<String, PackageEntry>,
    threshold: usize,
) -> Vec<(VersionConflict, Vec<String>)> {
    #[derive(Default)]
    struct Group {
        versions: BTreeSet<SemanticVersion>,
        ranges: BTreeSet<String>,
        dependents: BTreeSet<String>,
    }

    let mut groups: BTreeMap<&str, Group> = BTreeMap::new();
    for entry in index.values() {
        let Some(version) = &entry.resolved_version else {
            continue;
        };
        let group = groups.entry(entry.name.as_str()).or_default();
        group.versions.insert(version.clone());
        group.ranges.extend(entry.requested_ranges.iter().cloned());
        group.dependents.extend(entry.dependents.iter().cloned());
    }

    let threshold = threshold.max(2);
    groups
        .into_iter()
        .filter(|(_, group)| group.versions.len() >= threshold)
        .map(|(name, group)| {
            let versions: Vec<SemanticVersion> = group.versions.into_iter().collect();
            let ranges: Vec<String> = group.ranges.into_iter().collect();
            (
                VersionConflict::analyze(name, &versions, &ranges),
                group.dependents.into_iter().collect(),
            )
        })
        .collect()
}

fn change_risk(from: &SemanticVersion, to: &SemanticVersion) -> VersionChange {
    let distance = classify_conflict(&[from.clone(), to.clone()]);
    let upgrade = to > from;
    let mut risk = match (distance, upgrade) {
        (ConflictType::Major, true) => RiskLevel::High,
        (ConflictType::Major, false) => RiskLevel::Critical,
        (ConflictType::Minor, true) | (ConflictType::Prerelease, _) => RiskLevel::Medium,
        (ConflictType::Minor, false) => RiskLevel::High,
        (ConflictType::Patch, true) | (ConflictType::None, _) => RiskLevel::Low,
        (ConflictType::Patch, false) => RiskLevel::Medium,
    };
    // Minor bumps below 1.0 are breaking by convention.
    if distance == ConflictType::Minor && (from.is_pre_stable() || to.is_pre_stable()) {
        risk = risk.escalate();
    }
    VersionChange {
        from: from.clone(),
        to: to.clone(),
        distance,
        upgrade,
        risk,
    }
}

/// Build the option moving every observed version to `target`.
#[must_use]
pub fn evaluate_option(
    strategy: ResolutionStrategy,
    target: &SemanticVersion,
    conflict: &VersionConflict,
) -> ResolutionOption {
    let changes: Vec<VersionChange> = conflict
        .versions
        .iter()
        .filter(|v| *v != target)
        .map(|v| change_risk(v, target))
        .collect();

    let ranges: Vec<VersionRange> = conflict
        .requested_ranges
        .iter()
        .filter_map(|raw| VersionRange::parse(raw).ok())
        .collect();
    let satisfies_all_ranges = ranges.iter().all(|r| r.satisfies(target));

    let mut risk = changes
        .iter()
        .map(|c| c.risk)
        .max()
        .unwrap_or(RiskLevel::Low);
    if !satisfies_all_ranges {
        risk = risk.escalate();
    }

    let description = format!(
        "{strategy}: move {} cop{} of {} to {target}",
        changes.len(),
        if changes.len() == 1 { "y" } else { "ies" },
        conflict.package_name
    );

    ResolutionOption {
        strategy,
        target: target.clone(),
        risk,
        satisfies_all_ranges,
        published: None,
        changes,
        description,
    }
}

/// The options for a conflict: the satisfying suggestion when there is
/// one, then the newest and the oldest observed versions.
#[must_use]
pub fn resolution_options(conflict: &VersionConflict) -> Vec<ResolutionOption> {
    let mut options = Vec::new();
    if let Some(ResolutionSuggestion::Satisfying(target)) = &conflict.suggested_fix {
        options.push(evaluate_option(ResolutionStrategy::AdoptSuggested, target, conflict));
    }
    if let Some(latest) = conflict.versions.last() {
        options.push(evaluate_option(ResolutionStrategy::AdoptLatest, latest, conflict));
    }
    if let Some(oldest) = conflict.versions.first() {
        options.push(evaluate_option(ResolutionStrategy::AdoptOldest, oldest, conflict));
    }
    options
}
