//! Whole-repository analysis for monodep.
//!
//! [`Analyzer::analyze`] discovers the workspace packages under a root,
//! builds their dependency tree, detects circular dependencies between them
//! and merges everything into an [`AnalysisReport`] that also records what
//! had to be skipped along the way. [`check_cycles`] runs the cycle
//! detection alone.

mod analyzer;
pub mod config;
mod error;
mod report;

pub use analyzer::{
    Analyzer, AnalyzerCaches, NODE_CACHE_NAMESPACE, TREE_CACHE_NAMESPACE, check_cycles,
    external_resolver,
};
pub use config::{AnalyzerConfig, CONFIG_FILE_NAME};
pub use error::{Error, Result};
pub use report::{AnalysisReport, CycleCheck, DegradationSummary, ReportSummary};
