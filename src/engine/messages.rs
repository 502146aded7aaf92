use std::sync::Arc;

use crate::analysis::ConfluenceOutcome;
use crate::models::timeseries::TimeSeriesCollection;

/// A request to evaluate confluence for a specific pair
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub pair_name: String,
    /// Timestamp the result will carry
    pub now_ms: i64,
    // We pass a reference to the immutable timeseries data
    pub timeseries: Arc<TimeSeriesCollection>,
}

/// The result returned by the worker
#[derive(Debug, Clone)]
pub struct JobResult {
    pub pair_name: String,
    pub duration_ms: u128,
    pub outcome: ConfluenceOutcome,
}
