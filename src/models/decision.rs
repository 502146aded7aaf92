use serde::{Deserialize, Serialize};

#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, strum_macros::Display,
)]
pub enum PositionDirection {
    Long,
    Short,
}

impl PositionDirection {
    pub fn opposes(&self, other: PositionDirection) -> bool {
        *self != other
    }
}

/// An already-open position as the coordinator sees it. Exposure is the
/// notional value at risk, denominated in account currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub pair: String,
    pub direction: PositionDirection,
    pub exposure: f64,
    pub opened_at_ms: i64,
}

/// Closed enumeration of rejection causes. An approved decision carries no
/// reason; a rejected one carries exactly one.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
pub enum RejectReason {
    Halted,
    InsufficientRiskReward,
    ExposureCap,
    BelowMinSize,
    ConflictDiscarded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSizeDecision {
    pub pair: String,
    pub approved: bool,
    pub size: f64,
    pub reason: Option<RejectReason>,
}

impl PositionSizeDecision {
    pub fn approved(pair: impl Into<String>, size: f64) -> Self {
        Self {
            pair: pair.into(),
            approved: true,
            size,
            reason: None,
        }
    }

    pub fn rejected(pair: impl Into<String>, reason: RejectReason) -> Self {
        Self {
            pair: pair.into(),
            approved: false,
            size: 0.0,
            reason: Some(reason),
        }
    }
}
