//! Drawdown state machine and stress detection configuration

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::models::emergency::EmergencyLevel;
use crate::utils::TimeUtils;

/// What a given emergency level does to trading. One row of the protocol
/// table; the full table lives in `EmergencyConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelProtocol {
    pub position_size_multiplier: f64,
    pub minimum_required_risk_reward: f64,
    pub trading_halted: bool,
}

/// Settings for the portfolio drawdown state machine and the independent
/// stress-event detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyConfig {
    /// Drawdown fractions where each level begins. Must be strictly
    /// increasing. Normal is everything below `elevated_drawdown`.
    pub elevated_drawdown: f64,
    pub crisis_drawdown: f64,
    pub halt_drawdown: f64,

    /// A candidate escalation only fires after this many consecutive
    /// observations agree - one anomalous print never escalates on its own
    pub min_consecutive_breaches: u32,

    /// Dwell time a lower candidate level must hold before de-escalation is
    /// accepted. Prevents flapping around a threshold.
    pub deescalation_dwell_ms: i64,

    // Per-level protocol table
    pub normal: LevelProtocol,
    pub elevated: LevelProtocol,
    pub crisis: LevelProtocol,
    pub halt: LevelProtocol,

    // --- Stress detector ---
    /// Number of recent returns in the short realized-vol window
    pub stress_vol_window: usize,
    /// Number of returns in the rolling baseline window
    pub stress_baseline_window: usize,
    /// current_vol / baseline_vol above this emits a VolatilitySpike
    pub stress_severity_factor: f64,
    /// Close-to-close gap fraction that emits a LiquidityGap
    pub stress_gap_pct: f64,
    /// Average |pairwise correlation| above this emits CorrelationBreakdown
    pub stress_correlation_level: f64,
    /// Active stress events expire after this long
    pub stress_ttl_ms: i64,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            elevated_drawdown: 0.05,
            crisis_drawdown: 0.15,
            halt_drawdown: 0.25,
            min_consecutive_breaches: 2,
            deescalation_dwell_ms: 30 * TimeUtils::MS_IN_MIN,
            normal: LevelProtocol {
                position_size_multiplier: 1.0,
                minimum_required_risk_reward: 1.5,
                trading_halted: false,
            },
            elevated: LevelProtocol {
                position_size_multiplier: 0.5,
                minimum_required_risk_reward: 2.0,
                trading_halted: false,
            },
            crisis: LevelProtocol {
                position_size_multiplier: 0.25,
                minimum_required_risk_reward: 2.5,
                trading_halted: false,
            },
            halt: LevelProtocol {
                position_size_multiplier: 0.0,
                minimum_required_risk_reward: 3.0,
                trading_halted: true,
            },
            stress_vol_window: 12,
            stress_baseline_window: 96,
            stress_severity_factor: 3.0,
            stress_gap_pct: 0.05,
            stress_correlation_level: 0.9,
            stress_ttl_ms: 4 * TimeUtils::MS_IN_H,
        }
    }
}

impl EmergencyConfig {
    pub fn protocol(&self, level: EmergencyLevel) -> &LevelProtocol {
        match level {
            EmergencyLevel::Normal => &self.normal,
            EmergencyLevel::Elevated => &self.elevated,
            EmergencyLevel::Crisis => &self.crisis,
            EmergencyLevel::Halt => &self.halt,
        }
    }

    /// Map a drawdown fraction to its candidate level via the ordered
    /// thresholds. Pure; hysteresis is applied by the state machine.
    pub fn level_for_drawdown(&self, drawdown: f64) -> EmergencyLevel {
        if drawdown >= self.halt_drawdown {
            EmergencyLevel::Halt
        } else if drawdown >= self.crisis_drawdown {
            EmergencyLevel::Crisis
        } else if drawdown >= self.elevated_drawdown {
            EmergencyLevel::Elevated
        } else {
            EmergencyLevel::Normal
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0 < self.elevated_drawdown
            && self.elevated_drawdown < self.crisis_drawdown
            && self.crisis_drawdown < self.halt_drawdown
            && self.halt_drawdown < 1.0)
        {
            bail!(
                "Drawdown thresholds must be strictly increasing in (0, 1): {} / {} / {}",
                self.elevated_drawdown,
                self.crisis_drawdown,
                self.halt_drawdown
            );
        }
        if self.min_consecutive_breaches == 0 {
            bail!("min_consecutive_breaches must be at least 1");
        }
        if self.deescalation_dwell_ms < 0 {
            bail!("De-escalation dwell time cannot be negative");
        }
        // Multipliers must shrink with severity, and only Halt halts
        let multipliers = [
            self.normal.position_size_multiplier,
            self.elevated.position_size_multiplier,
            self.crisis.position_size_multiplier,
            self.halt.position_size_multiplier,
        ];
        if multipliers.windows(2).any(|w| w[1] > w[0]) {
            bail!("position_size_multiplier must be non-increasing with severity");
        }
        if self.halt.position_size_multiplier != 0.0 || !self.halt.trading_halted {
            bail!("Halt protocol must set multiplier 0 and trading_halted");
        }
        let rrs = [
            self.normal.minimum_required_risk_reward,
            self.elevated.minimum_required_risk_reward,
            self.crisis.minimum_required_risk_reward,
            self.halt.minimum_required_risk_reward,
        ];
        if rrs.windows(2).any(|w| w[1] < w[0]) {
            bail!("minimum_required_risk_reward must be non-decreasing with severity");
        }
        if self.stress_vol_window < 2 || self.stress_baseline_window <= self.stress_vol_window {
            bail!("Stress windows must satisfy 2 <= vol_window < baseline_window");
        }
        if self.stress_severity_factor <= 1.0 {
            bail!("Stress severity factor must exceed 1.0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawdown_to_level_mapping() {
        let config = EmergencyConfig::default();
        assert_eq!(config.level_for_drawdown(0.0), EmergencyLevel::Normal);
        assert_eq!(config.level_for_drawdown(0.049), EmergencyLevel::Normal);
        assert_eq!(config.level_for_drawdown(0.05), EmergencyLevel::Elevated);
        assert_eq!(config.level_for_drawdown(0.15), EmergencyLevel::Crisis);
        assert_eq!(config.level_for_drawdown(0.25), EmergencyLevel::Halt);
        assert_eq!(config.level_for_drawdown(0.9), EmergencyLevel::Halt);
    }

    #[test]
    fn level_is_monotone_in_drawdown() {
        let config = EmergencyConfig::default();
        let mut prev = EmergencyLevel::Normal;
        for step in 0..1000 {
            let dd = step as f64 / 1000.0;
            let level = config.level_for_drawdown(dd);
            assert!(level >= prev, "level regressed at drawdown {}", dd);
            prev = level;
        }
    }

    #[test]
    fn protocol_table_lookup() {
        let config = EmergencyConfig::default();
        assert_eq!(
            config.protocol(EmergencyLevel::Normal).position_size_multiplier,
            1.0
        );
        assert!(config.protocol(EmergencyLevel::Halt).trading_halted);
        assert!(!config.protocol(EmergencyLevel::Crisis).trading_halted);
    }

    #[test]
    fn growing_multiplier_rejected() {
        let mut config = EmergencyConfig::default();
        config.crisis.position_size_multiplier = 0.9; // above elevated's 0.5
        assert!(config.validate().is_err());
    }
}
