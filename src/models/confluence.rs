use serde::{Deserialize, Serialize};

use crate::domain::timeframe::Timeframe;

#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, strum_macros::Display,
)]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

/// Score bands. Only Moderate and above can produce a Buy/Sell.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Debug,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
pub enum ConfluenceStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl ConfluenceStrength {
    /// Band edges: weak < 0.3, moderate 0.3-0.6, strong 0.6-0.8, very strong >= 0.8
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfluenceStrength::VeryStrong
        } else if score >= 0.6 {
            ConfluenceStrength::Strong
        } else if score >= 0.3 {
            ConfluenceStrength::Moderate
        } else {
            ConfluenceStrength::Weak
        }
    }

    pub fn is_actionable(&self) -> bool {
        *self >= ConfluenceStrength::Moderate
    }
}

#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, strum_macros::Display,
)]
pub enum RecommendedAction {
    Buy,
    Sell,
    Hold,
}

/// One timeframe's verdict before fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeAnalysis {
    pub timeframe: Timeframe,
    pub trend_direction: TrendDirection,
    /// Normalized separation of the fast/slow pair, clipped to [0, 1]
    pub signal_strength: f64,
}

/// The fused, immutable recommendation for one pair. Created fresh on every
/// recompute; never mutated after emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceResult {
    pub pair: String,
    pub weekly: TimeframeAnalysis,
    pub daily: TimeframeAnalysis,
    pub h4: TimeframeAnalysis,

    pub confluence_score: f64,
    pub confluence_strength: ConfluenceStrength,
    pub recommended_action: RecommendedAction,

    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub risk_reward_ratio: f64,
    pub confidence: f64,

    pub computed_at_ms: i64,
}

impl ConfluenceResult {
    pub fn is_actionable(&self) -> bool {
        self.recommended_action != RecommendedAction::Hold
    }

    /// The distance the stop sits from entry. Always positive for a valid
    /// result (degenerate stops are rejected upstream).
    pub fn stop_distance(&self) -> f64 {
        (self.entry - self.stop_loss).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_band_edges() {
        assert_eq!(
            ConfluenceStrength::from_score(0.299),
            ConfluenceStrength::Weak
        );
        assert_eq!(
            ConfluenceStrength::from_score(0.3),
            ConfluenceStrength::Moderate
        );
        assert_eq!(
            ConfluenceStrength::from_score(0.6),
            ConfluenceStrength::Strong
        );
        assert_eq!(
            ConfluenceStrength::from_score(0.8),
            ConfluenceStrength::VeryStrong
        );
    }

    #[test]
    fn only_moderate_and_above_actionable() {
        assert!(!ConfluenceStrength::Weak.is_actionable());
        assert!(ConfluenceStrength::Moderate.is_actionable());
        assert!(ConfluenceStrength::VeryStrong.is_actionable());
    }
}
