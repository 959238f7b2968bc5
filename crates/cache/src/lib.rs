//! Multi-tier caching of dependency resolution results.
//!
//! A [`ResolutionCache`] keeps results in three tiers:
//! - a small hot map for the entries read most recently
//! - a bounded warm map, snapshotted to disk during maintenance
//! - a cold tier of one JSON file per key
//!
//! Entries carry the digest of the inputs they were computed from. Once
//! [`ResolutionCache::invalidate`] has been called for a digest, nothing
//! computed from it is served again, from any tier.
//!
//! Keys are built with [`package_key`] and [`tree_key`] so that equal
//! inputs always map to the same entry.

mod entry;
mod error;
mod keys;
mod metrics;
mod root;
mod store;

pub use entry::CachedResolution;
pub use error::{Error, Result};
pub use keys::{InputHasher, package_key, tree_key};
pub use metrics::{CacheMetrics, MetricsSnapshot, Tier};
pub use root::{CACHE_DIR_ENV, cache_root};
pub use store::{CacheConfig, CacheStats, MaintenanceReport, ResolutionCache};
