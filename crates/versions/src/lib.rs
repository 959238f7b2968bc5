//! Semantic versions, version ranges and conflict analysis for monodep.
//!
//! This crate has no knowledge of workspaces or registries. It provides the
//! value types and pure functions the rest of monodep builds on:
//!
//! - [`SemanticVersion`] - strict `major.minor.patch[-pre][+build]` versions
//! - [`VersionRange`] - single-operator ranges (`^`, `~`, `>=`, `<=`, `>`, `<`, `=`)
//! - [`classify_conflict`], [`suggest_resolution`], [`assess_risk`] - the
//!   conflict vocabulary shared by the resolver and the cycle detector
//!
//! # Example
//!
//! ```
//! use monodep_versions::{SemanticVersion, VersionRange};
//!
//! let range = VersionRange::parse("^1.2.3")?;
//! assert!(range.satisfies(&SemanticVersion::parse("1.9.0")?));
//! assert!(!range.satisfies(&SemanticVersion::parse("2.0.0")?));
//! # Ok::<(), monodep_versions::Error>(())
//! ```

pub mod conflict;
pub mod error;
pub mod range;
pub mod version;

pub use conflict::{
    ConflictType, ResolutionDifficulty, ResolutionSuggestion, RiskAssessment, RiskLevel,
    VersionConflict, assess_risk, classify_conflict, suggest_resolution,
};
pub use error::{Error, Result};
pub use range::{RangeOperator, VersionRange, satisfies};
pub use version::{SemanticVersion, compare};
