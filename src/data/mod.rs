// External collaborators: market data in, events/snapshots out.
// The engine only ever sees these traits; transport, retries and storage
// live behind them.
pub mod candle_cache;
pub mod memory;

// Re-export commonly used types
pub use candle_cache::{CandleCache, CandleCacheFile};
pub use memory::{LogNotifier, MemorySink, MemorySource};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::candle::Candle;
use crate::domain::timeframe::{PairTimeframe, Timeframe};
use crate::models::confluence::ConfluenceResult;
use crate::models::emergency::{EmergencyEvent, PortfolioSnapshot, StressEvent};
use crate::models::timeseries::{OhlcvTimeSeries, TimeSeriesCollection};

/// The only failure a data source may surface to the engine. The engine
/// recovers locally by reporting the pair "not ready" - this never becomes
/// a caller-visible fault.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    #[error("data unavailable for {pair} at {timeframe}: {detail}")]
    Unavailable {
        pair: String,
        timeframe: Timeframe,
        detail: String,
    },
}

impl DataError {
    pub fn unavailable(pair: &str, timeframe: Timeframe, detail: impl Into<String>) -> Self {
        DataError::Unavailable {
            pair: pair.to_string(),
            timeframe,
            detail: detail.into(),
        }
    }
}

/// Candle retrieval. Implementations carry their own retry policy; by the
/// time a call returns here it either has candles or is `Unavailable`.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn signature(&self) -> &'static str;

    /// The most recent `count` candles for the pair/timeframe, oldest first.
    /// Fewer than `count` may be returned; the analysis layer decides what
    /// counts as "ready".
    async fn get_candles(
        &self,
        pair: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, DataError>;
}

/// Append-only event/metric persistence. Strictly fire-and-forget from the
/// engine's point of view: a failing sink is logged and counted, and must
/// never block an in-memory state transition.
pub trait PersistenceSink: Send + Sync {
    fn append_emergency_event(&self, event: &EmergencyEvent) -> Result<()>;
    fn append_stress_event(&self, event: &StressEvent) -> Result<()>;
    fn append_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()>;
}

/// Downstream delivery of emitted signals and events. Delivery transport
/// (Discord, webhooks, ...) is someone else's problem.
pub trait NotificationSink: Send + Sync {
    fn notify_signal(&self, result: &ConfluenceResult);
    fn notify_emergency(&self, event: &EmergencyEvent);
    fn notify_stress(&self, event: &StressEvent);
}

/// Assemble an analysis-ready collection from a data source, all three
/// timeframes per pair. Anything the source cannot serve is skipped with a
/// log line - the engine reports those pairs "not ready" rather than
/// failing.
pub async fn load_collection(
    source: &dyn MarketDataSource,
    pairs: &[String],
) -> TimeSeriesCollection {
    use strum::IntoEnumIterator;

    let mut collection = TimeSeriesCollection::default();
    for pair in pairs {
        for timeframe in Timeframe::iter() {
            // Headroom over the minimum so indicators have warm-up candles
            let count = timeframe.min_lookback() + 50;
            match source.get_candles(pair, timeframe, count).await {
                Ok(candles) => {
                    collection.insert(OhlcvTimeSeries::from_candles(
                        PairTimeframe::new(pair.clone(), timeframe),
                        &candles,
                    ));
                }
                Err(e) => {
                    log::warn!("Skipping {} at {}: {}", pair, timeframe.label(), e);
                }
            }
        }
    }
    collection
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_collection_tolerates_missing_timeframes() {
        let mut source = MemorySource::new();
        let candles: Vec<Candle> = (0..10)
            .map(|i| Candle::new(i, 1.0, 2.0, 0.5, 1.5, 10.0))
            .collect();
        // Only the H4 series exists for this pair
        source.insert("BTCUSDT", Timeframe::H4, candles);

        let collection = load_collection(&source, &["BTCUSDT".to_string()]).await;
        assert_eq!(collection.series_data.len(), 1);
        assert_eq!(
            collection.series_data[0].pair_timeframe.timeframe,
            Timeframe::H4
        );
    }
}
