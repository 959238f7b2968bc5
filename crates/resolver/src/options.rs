//! Settings for one tree build.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to resolve and how hard to try.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Deepest node depth kept; roots are depth 0.
    pub max_depth: usize,
    /// Follow `devDependencies` of root packages.
    pub include_dev_dependencies: bool,
    /// Follow `peerDependencies` of workspace packages.
    pub include_peer_dependencies: bool,
    /// Resolve names of workspace packages locally.
    pub prefer_workspace: bool,
    /// Read and write the resolution caches.
    pub use_cache: bool,
    /// Registry calls in flight at once.
    pub concurrency_level: usize,
    /// Bound on each registry call.
    #[serde(rename = "package_timeout_ms", with = "duration_millis")]
    pub package_timeout: Duration,
    /// Distinct versions of one name that count as a conflict.
    pub conflict_threshold: usize,
    /// Record the fix for conflicts whose best option is low risk.
    pub auto_resolve_conflicts: bool,
    /// Retries granted to a failing registry call when recovery asks for one.
    pub retry_attempts: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            include_dev_dependencies: true,
            include_peer_dependencies: false,
            prefer_workspace: true,
            use_cache: true,
            concurrency_level: 8,
            package_timeout: Duration::from_secs(30),
            conflict_threshold: 2,
            auto_resolve_conflicts: false,
            retry_attempts: 1,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
