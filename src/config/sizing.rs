//! Position sizing and conflict resolution configuration

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Fraction of account balance risked per trade
    pub risk_per_trade: f64,
    /// Positions smaller than this are rejected, never rounded up -
    /// rounding up would exceed the intended risk
    pub min_position_size: f64,
    /// Opposing same-pair signals net to zero unless the winner's confidence
    /// exceeds the loser's by at least this margin
    pub conflict_confidence_margin: f64,
    /// Trigger threshold for automatic re-evaluation of a pair after its
    /// price moves this fraction from the last analyzed price
    pub price_recalc_threshold_pct: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.01,
            min_position_size: 0.001,
            conflict_confidence_margin: 0.15,
            price_recalc_threshold_pct: 0.01,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.risk_per_trade) || self.risk_per_trade == 0.0 {
            bail!("risk_per_trade must lie in (0, 1)");
        }
        if self.min_position_size < 0.0 {
            bail!("Minimum position size cannot be negative");
        }
        if !(0.0..=1.0).contains(&self.conflict_confidence_margin) {
            bail!("Conflict confidence margin must lie in [0, 1]");
        }
        if self.price_recalc_threshold_pct <= 0.0 {
            bail!("Price recalc threshold must be positive");
        }
        Ok(())
    }
}
