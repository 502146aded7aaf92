//! Cross-pair correlation and exposure cap configuration

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::utils::TimeUtils;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Trailing return window the matrix is computed from
    pub window_size: usize,
    /// Recompute cadence. The matrix is a periodic batch swap, never a
    /// per-tick mutation.
    pub recompute_interval_ms: i64,
    /// |corr| above this makes two pairs count as one exposure bucket,
    /// and crossings of it are logged as alerts
    pub breach_threshold: f64,
    /// Hard cap on combined correlated exposure, as a fraction of balance
    pub max_correlated_exposure: f64,
    /// A matrix older than this is treated as unavailable (fail-safe:
    /// candidates are assumed maximally correlated)
    pub stale_after_ms: i64,
    /// Bound on the in-memory breach alert log
    pub max_alerts_kept: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            recompute_interval_ms: 5 * TimeUtils::MS_IN_MIN,
            breach_threshold: 0.7,
            max_correlated_exposure: 0.25,
            stale_after_ms: 30 * TimeUtils::MS_IN_MIN,
            max_alerts_kept: 256,
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 2 {
            bail!("Correlation window must hold at least 2 returns");
        }
        if self.recompute_interval_ms <= 0 {
            bail!("Recompute interval must be positive");
        }
        if !(0.0..=1.0).contains(&self.breach_threshold) {
            bail!("Breach threshold must lie in [0, 1]");
        }
        if self.max_correlated_exposure <= 0.0 {
            bail!("Correlated exposure cap must be positive");
        }
        if self.stale_after_ms < self.recompute_interval_ms {
            bail!("Staleness horizon cannot be shorter than the recompute cadence");
        }
        Ok(())
    }
}
