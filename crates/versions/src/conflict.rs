//! Conflict classification, resolution suggestions and risk assessment.
//!
//! Everything here is a pure function of the versions and ranges observed
//! for a single package name. Results are computed once per analysis and
//! never mutated afterwards.

use crate::range::VersionRange;
use crate::version::SemanticVersion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How far apart the observed versions of one package are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    /// All observed versions are identical.
    None,
    /// Versions differ only in patch.
    Patch,
    /// Versions differ in minor.
    Minor,
    /// Versions differ in major.
    Major,
    /// Identical release triples, but at least one prerelease is involved.
    Prerelease,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Prerelease => "prerelease",
        };
        f.write_str(label)
    }
}

/// Severity vocabulary shared by version conflicts and circular dependencies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Safe to apply without review.
    #[default]
    Low,
    /// Needs a quick look.
    Medium,
    /// Likely to break something.
    High,
    /// Almost certainly breaks something.
    Critical,
}

impl RiskLevel {
    /// One level more severe, saturating at [`RiskLevel::Critical`].
    #[must_use]
    pub const fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Rough effort needed to settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionDifficulty {
    /// Bump a range, reinstall.
    Trivial,
    /// Some call sites may need touching.
    Moderate,
    /// Requires migrating across breaking changes.
    Hard,
}

/// Risk of a conflict, with the reasoning behind the level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Final level after escalation.
    pub level: RiskLevel,
    /// Human-readable reasons that contributed to the level.
    pub reasons: Vec<String>,
    /// What goes wrong if the conflict is left alone.
    pub impact: String,
    /// Expected effort to resolve.
    pub difficulty: ResolutionDifficulty,
}

/// A proposed version for a conflicting package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "version", rename_all = "snake_case")]
pub enum ResolutionSuggestion {
    /// The version satisfies every requested range.
    Satisfying(SemanticVersion),
    /// No candidate satisfies every range; this is the highest observed
    /// version and compatibility is not guaranteed.
    BestEffort(SemanticVersion),
}

impl ResolutionSuggestion {
    /// The suggested version.
    #[must_use]
    pub const fn version(&self) -> &SemanticVersion {
        match self {
            Self::Satisfying(v) | Self::BestEffort(v) => v,
        }
    }

    /// Whether the suggestion satisfies every requested range.
    #[must_use]
    pub const fn is_guaranteed(&self) -> bool {
        matches!(self, Self::Satisfying(_))
    }
}

/// Classify how far apart a set of versions for one package are.
///
/// Distinct majors win over distinct minors, which win over distinct
/// patches; identical triples with a prerelease tag anywhere are
/// `Prerelease`; otherwise `None`.
#[must_use]
pub fn classify_conflict(versions: &[SemanticVersion]) -> ConflictType {
    let majors: BTreeSet<u64> = versions.iter().map(|v| v.major).collect();
    if majors.len() > 1 {
        return ConflictType::Major;
    }

    let minors: BTreeSet<(u64, u64)> = versions.iter().map(|v| (v.major, v.minor)).collect();
    if minors.len() > 1 {
        return ConflictType::Minor;
    }

    let patches: BTreeSet<(u64, u64, u64)> = versions.iter().map(SemanticVersion::triple).collect();
    if patches.len() > 1 {
        return ConflictType::Patch;
    }

    if versions.iter().any(SemanticVersion::is_prerelease) {
        return ConflictType::Prerelease;
    }

    ConflictType::None
}

/// Pick a single version for a set of conflicting ranges.
///
/// Candidates are every observed version, every range's own version and the
/// upper boundary implied by caret and tilde ranges. The highest candidate
/// satisfying all ranges wins. When none does, the highest observed version
/// is returned as [`ResolutionSuggestion::BestEffort`]. Returns `None` when
/// nothing was observed and no range matched.
#[must_use]
pub fn suggest_resolution(
    ranges: &[VersionRange],
    observed: &[SemanticVersion],
) -> Option<ResolutionSuggestion> {
    let mut candidates: BTreeSet<SemanticVersion> = observed.iter().cloned().collect();
    for range in ranges {
        candidates.insert(range.version.clone());
        if let Some(boundary) = range.upper_boundary() {
            candidates.insert(boundary);
        }
    }

    let satisfying = candidates
        .iter()
        .rev()
        .find(|candidate| ranges.iter().all(|range| range.satisfies(candidate)));

    if let Some(version) = satisfying {
        return Some(ResolutionSuggestion::Satisfying(version.clone()));
    }

    observed
        .iter()
        .max()
        .cloned()
        .map(ResolutionSuggestion::BestEffort)
}

/// Assess how risky a conflict is.
///
/// The base level follows the conflict type and is escalated by exactly one
/// level when more than three distinct versions are in play or any of them
/// is pre-1.0.
#[must_use]
pub fn assess_risk(conflict_type: ConflictType, versions: &[SemanticVersion]) -> RiskAssessment {
    let (base, difficulty, impact) = match conflict_type {
        ConflictType::Major => (
            RiskLevel::Critical,
            ResolutionDifficulty::Hard,
            "Multiple major versions are bundled; breaking API differences are likely",
        ),
        ConflictType::Minor => (
            RiskLevel::High,
            ResolutionDifficulty::Moderate,
            "Different feature sets are in use across packages",
        ),
        ConflictType::Prerelease => (
            RiskLevel::High,
            ResolutionDifficulty::Moderate,
            "Prerelease builds may change without notice",
        ),
        ConflictType::Patch => (
            RiskLevel::Medium,
            ResolutionDifficulty::Trivial,
            "Duplicate copies increase install size; behavior should match",
        ),
        ConflictType::None => (
            RiskLevel::Low,
            ResolutionDifficulty::Trivial,
            "No behavioral impact expected",
        ),
    };

    let mut reasons = vec![format!("{conflict_type} version conflict")];
    let distinct: BTreeSet<&SemanticVersion> = versions.iter().collect();

    let many_versions = distinct.len() > 3;
    if many_versions {
        reasons.push(format!("{} distinct versions in use", distinct.len()));
    }

    let pre_stable = distinct.iter().any(|v| v.is_pre_stable());
    if pre_stable {
        reasons.push("pre-1.0 version present; minor bumps may break".to_string());
    }

    let level = if many_versions || pre_stable {
        base.escalate()
    } else {
        base
    };

    RiskAssessment {
        level,
        reasons,
        impact: impact.to_string(),
        difficulty,
    }
}

/// A detected version conflict for a single package name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConflict {
    /// Package the versions belong to.
    pub package_name: String,
    /// Classification of the spread.
    pub conflict_type: ConflictType,
    /// Distinct observed versions, ascending.
    pub versions: Vec<SemanticVersion>,
    /// Ranges that requested the package, in their original text.
    pub requested_ranges: Vec<String>,
    /// Whether a version satisfying every range exists among the candidates.
    pub is_resolvable: bool,
    /// Proposed version, if any.
    pub suggested_fix: Option<ResolutionSuggestion>,
    /// Risk of leaving or fixing the conflict.
    pub risk: RiskAssessment,
}

impl VersionConflict {
    /// Analyze the observed versions and requested ranges of one package.
    ///
    /// Ranges that fail to parse (tags, protocols, URLs) are kept in
    /// `requested_ranges` but ignored for the suggestion.
    #[must_use]
    pub fn analyze(
        package_name: impl Into<String>,
        versions: &[SemanticVersion],
        requested_ranges: &[String],
    ) -> Self {
        let distinct: Vec<SemanticVersion> = versions
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let parsed: Vec<VersionRange> = requested_ranges
            .iter()
            .filter_map(|raw| VersionRange::parse(raw).ok())
            .collect();

        let conflict_type = classify_conflict(&distinct);
        let suggested_fix = suggest_resolution(&parsed, &distinct);
        let is_resolvable = suggested_fix
            .as_ref()
            .is_some_and(ResolutionSuggestion::is_guaranteed);
        let risk = assess_risk(conflict_type, &distinct);

        let mut ranges = requested_ranges.to_vec();
        ranges.sort();
        ranges.dedup();

        Self {
            package_name: package_name.into(),
            conflict_type,
            versions: distinct,
            requested_ranges: ranges,
            is_resolvable,
            suggested_fix,
            risk,
        }
    }
}
