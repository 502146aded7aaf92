#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]

// Core modules
pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod models;
pub mod risk;
pub mod utils;

// The engine
pub mod engine;

// Re-export commonly used types
pub use analysis::{ConfluenceAnalyzer, ConfluenceOutcome};
pub use config::EngineConfig;
pub use data::{CandleCache, CandleCacheFile, LogNotifier, MemorySink};
pub use domain::{Candle, PairTimeframe, Timeframe};
pub use engine::WardenEngine;
pub use models::{
    ConfluenceResult, EmergencyEvent, EmergencyLevel, PositionSizeDecision, TimeSeriesCollection,
};
pub use utils::TimeUtils;

// CLI argument parsing
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the candle cache file (defaults to the standard cache location)
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Account balance the demo sizes positions against
    #[arg(long, default_value_t = 100_000.0)]
    pub balance: f64,
}
