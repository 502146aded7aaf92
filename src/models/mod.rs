pub mod confluence;
pub mod correlation;
pub mod decision;
pub mod emergency;
pub mod timeseries;

pub use confluence::{
    ConfluenceResult, ConfluenceStrength, RecommendedAction, TimeframeAnalysis, TrendDirection,
};
pub use correlation::{CorrelationAlert, CorrelationMatrix};
pub use decision::{OpenPosition, PositionDirection, PositionSizeDecision, RejectReason};
pub use emergency::{
    EmergencyEvent, EmergencyLevel, EmergencyStatus, PairMarketSnapshot, PortfolioSnapshot,
    StressEvent, StressEventType,
};
pub use timeseries::{OhlcvTimeSeries, TimeSeriesCollection, find_matching_ohlcv};
