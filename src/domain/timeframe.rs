use serde::{Deserialize, Serialize};

use crate::utils::TimeUtils;

/// The three analysis horizons fused by the confluence analyzer.
/// Variant order is slowest-first; weights and lookups key off this enum
/// everywhere instead of raw interval strings.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Serialize,
    Deserialize,
    strum_macros::EnumIter,
    strum_macros::Display,
)]
pub enum Timeframe {
    Weekly,
    Daily,
    H4,
}

impl Timeframe {
    pub fn interval_ms(&self) -> i64 {
        match self {
            Timeframe::Weekly => TimeUtils::MS_IN_W,
            Timeframe::Daily => TimeUtils::MS_IN_D,
            Timeframe::H4 => TimeUtils::MS_IN_4_H,
        }
    }

    /// Minimum candle count before analysis of this timeframe is considered
    /// ready. Below this the pair reports "not ready", not an error.
    pub fn min_lookback(&self) -> usize {
        match self {
            Timeframe::Weekly => 50,
            Timeframe::Daily => 50,
            Timeframe::H4 => 200,
        }
    }

    pub fn label(&self) -> &'static str {
        TimeUtils::interval_to_string(self.interval_ms())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Hash, Eq, PartialEq)]
pub struct PairTimeframe {
    pub pair: String,
    pub timeframe: Timeframe,
}

impl PairTimeframe {
    pub fn new(pair: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            pair: pair.into(),
            timeframe,
        }
    }
}

impl std::fmt::Display for PairTimeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} @ {}", self.pair, self.timeframe.label())
    }
}
