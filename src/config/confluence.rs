//! Multi-timeframe confluence analysis configuration

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Settings for the per-timeframe trend read and the cross-timeframe fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    /// Fast / slow EMA periods used for the trend read on every timeframe
    pub fast_period: usize,
    pub slow_period: usize,

    /// Fusion weights. Slower timeframes carry more weight; must sum to 1.
    pub weekly_weight: f64,
    pub daily_weight: f64,
    pub h4_weight: f64,

    /// Fast/slow separation below this fraction of price reads as Sideways
    pub sideways_band_pct: f64,
    /// Multiplier turning normalized fast/slow separation into a [0,1] strength
    pub strength_scale: f64,

    /// ATR period on H4 for stop/target construction
    pub atr_period: usize,
    pub atr_stop_mult: f64,
    pub atr_target_mult: f64,

    /// Signals with RR below this are dropped outright (not downgraded)
    pub min_risk_reward: f64,
    /// ATR below this fraction of entry price counts as degenerate - the stop
    /// distance would be meaningless, so the signal is dropped
    pub min_atr_pct_of_price: f64,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            fast_period: 10,
            slow_period: 30,
            weekly_weight: 0.40,
            daily_weight: 0.35,
            h4_weight: 0.25,
            sideways_band_pct: 0.001,
            strength_scale: 25.0,
            atr_period: 14,
            atr_stop_mult: 1.5,
            atr_target_mult: 3.0,
            min_risk_reward: 1.5,
            min_atr_pct_of_price: 1e-6,
        }
    }
}

impl ConfluenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fast_period == 0 || self.slow_period <= self.fast_period {
            bail!(
                "EMA periods must satisfy 0 < fast < slow (got fast {}, slow {})",
                self.fast_period,
                self.slow_period
            );
        }
        let weight_sum = self.weekly_weight + self.daily_weight + self.h4_weight;
        if (weight_sum - 1.0).abs() > 1e-9 {
            bail!("Timeframe weights must sum to 1.0 (got {})", weight_sum);
        }
        if self.weekly_weight < self.daily_weight || self.daily_weight < self.h4_weight {
            bail!("Weights must favor slower timeframes (weekly >= daily >= h4)");
        }
        if self.atr_period == 0 {
            bail!("ATR period must be positive");
        }
        if self.atr_stop_mult <= 0.0 || self.atr_target_mult <= 0.0 {
            bail!("ATR multiples must be positive");
        }
        if self.min_risk_reward <= 0.0 {
            bail!("Minimum risk/reward must be positive");
        }
        Ok(())
    }
}
