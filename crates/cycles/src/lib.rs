//! Circular dependency detection for monodep.
//!
//! A [`PackageGraph`] holds the workspace packages of a repository and the
//! dependency edges between them. [`CircularDetector`] walks it depth-first
//! and reports every cycle with break-point suggestions, an impact estimate
//! and remediation steps; [`health_score`] condenses the cycle count into a
//! single number.
//!
//! ```ignore
//! use monodep_cycles::{CircularDetector, PackageGraph};
//!
//! let graph = PackageGraph::from_packages(&report.packages, false);
//! let analysis = CircularDetector::default().analyze(&graph);
//! for cycle in &analysis.cycles {
//!     println!("{}", cycle.path());
//! }
//! ```

mod detector;
mod error;
mod graph;
mod health;

pub use detector::{
    BreakPoint, CircularDetector, CycleAnalysis, CycleReport, Effort, HOURS_PER_EDGE, ImpactReport,
};
pub use error::{Error, Result};
pub use graph::{GraphNode, PackageGraph};
pub use health::{HealthScoreConfig, health_score};
