use serde::{Deserialize, Serialize};

/// Portfolio risk-escalation state. The variant order IS the severity order:
/// derived Ord is the single source of truth for every comparison, so
/// "is this worse than that" is always `a > b` and nothing else.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
pub enum EmergencyLevel {
    Normal,
    Elevated,
    Crisis,
    Halt,
}

impl EmergencyLevel {
    pub fn is_halted(&self) -> bool {
        *self == EmergencyLevel::Halt
    }
}

/// Point-in-time record of portfolio state. Appended (never mutated) on every
/// accepted value observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub portfolio_value: f64,
    /// Monotonically non-decreasing high-water mark
    pub peak_value: f64,
    pub drawdown_pct: f64,
    pub emergency_level: EmergencyLevel,
    pub position_size_multiplier: f64,
    pub trading_halted: bool,
    pub timestamp_ms: i64,
}

/// Appended only on an actual level change - one event per transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyEvent {
    pub previous_level: EmergencyLevel,
    pub new_level: EmergencyLevel,
    pub drawdown_pct: f64,
    pub protocol_description: String,
    pub timestamp_ms: i64,
}

#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, strum_macros::Display,
)]
pub enum StressEventType {
    VolatilitySpike,
    CorrelationBreakdown,
    LiquidityGap,
}

/// Abnormal market condition detected independently of portfolio P&L.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressEvent {
    pub event_type: StressEventType,
    /// Ratio of observed to baseline (e.g. current vol / rolling threshold)
    pub severity: f64,
    pub affected_pairs: Vec<String>,
    pub recommended_action: String,
    pub detected_at_ms: i64,
}

/// Per-pair market observation handed to the stress detector: the recent
/// close history the volatility/gap reads run over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairMarketSnapshot {
    pub pair: String,
    pub closes: Vec<f64>,
    pub observed_at_ms: i64,
}

/// The read-only view returned by `get_status()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyStatus {
    pub emergency_level: EmergencyLevel,
    pub drawdown_pct: f64,
    pub position_size_multiplier: f64,
    pub trading_halted: bool,
    pub minimum_required_risk_reward: f64,
    pub active_stress_events: Vec<StressEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn severity_order_is_total() {
        assert!(EmergencyLevel::Normal < EmergencyLevel::Elevated);
        assert!(EmergencyLevel::Elevated < EmergencyLevel::Crisis);
        assert!(EmergencyLevel::Crisis < EmergencyLevel::Halt);

        let levels: Vec<EmergencyLevel> = EmergencyLevel::iter().collect();
        let mut sorted = levels.clone();
        sorted.sort();
        assert_eq!(levels, sorted, "declaration order must be severity order");
    }

    #[test]
    fn only_halt_halts() {
        assert!(EmergencyLevel::Halt.is_halted());
        assert!(!EmergencyLevel::Crisis.is_halted());
    }

    #[test]
    fn snapshot_serde_roundtrip_preserves_all_fields() {
        let snapshot = PortfolioSnapshot {
            portfolio_value: 92_500.0,
            peak_value: 100_000.0,
            drawdown_pct: 0.075,
            emergency_level: EmergencyLevel::Elevated,
            position_size_multiplier: 0.5,
            trading_halted: false,
            timestamp_ms: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: PortfolioSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    #[test]
    fn event_serde_roundtrip_preserves_all_fields() {
        let event = EmergencyEvent {
            previous_level: EmergencyLevel::Normal,
            new_level: EmergencyLevel::Crisis,
            drawdown_pct: 0.18,
            protocol_description: "size multiplier 0.25, min RR 2.5".to_string(),
            timestamp_ms: 1_700_000_060_000,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: EmergencyEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
