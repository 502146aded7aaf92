pub mod core;
pub mod messages;
pub mod state;
pub mod worker;

pub use core::{EngineCounters, WardenEngine};
pub use state::PairState;
