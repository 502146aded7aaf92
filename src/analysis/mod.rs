pub mod confluence;
pub mod indicators;

pub use confluence::{ConfluenceAnalyzer, ConfluenceOutcome};
