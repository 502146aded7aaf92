use std::sync::Arc;

use crate::models::confluence::ConfluenceResult;

/// Represents the state of a single pair in the engine.
#[derive(Debug, Clone, Default)]
pub struct PairState {
    /// THE FRONT BUFFER.
    /// Readers take a clone of this Arc; when a fresh result arrives we
    /// simply replace the pointer. Never locked for writing.
    pub result: Option<Arc<ConfluenceResult>>,

    /// Metadata for the trigger system
    pub last_update_price: f64,
    pub last_update_ms: i64,

    /// Is the worker currently crunching this pair?
    pub is_calculating: bool,

    /// Last analysis complaint (if any), for telemetry
    pub last_error: Option<String>,
}

impl PairState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The "swap" operation: promote a finished result to the front buffer.
    pub fn update_buffer(&mut self, new_result: Arc<ConfluenceResult>) {
        self.last_update_ms = new_result.computed_at_ms;
        self.result = Some(new_result);
        self.is_calculating = false;
        self.last_error = None;
    }
}
