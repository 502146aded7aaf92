//! Configuration module for the signal-warden engine.

pub mod confluence;
pub mod correlation;
pub mod emergency;
pub mod persistence;
pub mod sizing;

mod debug; // Private; use the public re-export crate::config::DEBUG_FLAGS
pub use debug::DEBUG_FLAGS;

pub use confluence::ConfluenceConfig;
pub use correlation::CorrelationConfig;
pub use emergency::{EmergencyConfig, LevelProtocol};
pub use persistence::{CANDLE_CACHE_PATH, CANDLE_CACHE_VERSION, candle_cache_filename};
pub use sizing::SizingConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// The Master Engine Configuration.
///
/// All thresholds, multipliers and weights live here rather than as
/// hard-coded constants: the escalation figures were empirically tuned in
/// production and operators need to adjust them without recompiling.
/// Validated exactly once, at engine construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub confluence: ConfluenceConfig,
    pub emergency: EmergencyConfig,
    pub correlation: CorrelationConfig,
    pub sizing: SizingConfig,
}

impl EngineConfig {
    /// Check every sub-group once. Construction is the only place this runs;
    /// past this point the engine trusts the figures unconditionally.
    pub fn validate(&self) -> Result<()> {
        self.confluence.validate()?;
        self.emergency.validate()?;
        self.correlation.validate()?;
        self.sizing.validate()?;
        Ok(())
    }
}
