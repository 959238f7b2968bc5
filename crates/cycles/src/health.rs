//! Repository health from the cycle count.

use serde::{Deserialize, Serialize};

/// Constants of the health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthScoreConfig {
    /// Most points a repository can lose to cycles.
    pub max_penalty: u32,
}

impl Default for HealthScoreConfig {
    fn default() -> Self {
        Self { max_penalty: 80 }
    }
}

/// `100 - min(max_penalty, round(cycles / total * max_penalty))`, never
/// below 0. An empty repository scores 100.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn health_score(cycles: usize, total_packages: usize, config: &HealthScoreConfig) -> u8 {
    if total_packages == 0 || cycles == 0 {
        return 100;
    }
    let ratio = cycles as f64 / total_packages as f64;
    let max_penalty = f64::from(config.max_penalty);
    let penalty = (ratio * max_penalty).round().min(max_penalty);
    (100.0 - penalty).clamp(0.0, 100.0) as u8
}
