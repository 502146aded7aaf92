use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::candle::Candle;
use crate::domain::timeframe::Timeframe;
use crate::models::confluence::ConfluenceResult;
use crate::models::emergency::{EmergencyEvent, PortfolioSnapshot, StressEvent};

use super::{DataError, MarketDataSource, NotificationSink, PersistenceSink};

/// In-memory candle source. Used by tests and the demo binary; shape-wise
/// identical to any remote source the engine might be handed.
#[derive(Default)]
pub struct MemorySource {
    candles: HashMap<(String, Timeframe), Vec<Candle>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pair: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.candles.insert((pair.to_string(), timeframe), candles);
    }
}

#[async_trait]
impl MarketDataSource for MemorySource {
    fn signature(&self) -> &'static str {
        "In-Memory"
    }

    async fn get_candles(
        &self,
        pair: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, DataError> {
        let all = self
            .candles
            .get(&(pair.to_string(), timeframe))
            .ok_or_else(|| DataError::unavailable(pair, timeframe, "pair not loaded"))?;
        let start = all.len().saturating_sub(count);
        Ok(all[start..].to_vec())
    }
}

/// Three append-only, timestamp-keyed logs, queryable by time range.
/// The interior Mutex keeps the sink usable behind an `Arc` without the
/// engine needing `&mut` to persist.
#[derive(Default)]
pub struct MemorySink {
    emergency_events: Mutex<Vec<EmergencyEvent>>,
    stress_events: Mutex<Vec<StressEvent>>,
    portfolio_metrics: Mutex<Vec<PortfolioSnapshot>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emergency_events_between(&self, start_ms: i64, end_ms: i64) -> Vec<EmergencyEvent> {
        self.emergency_events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.timestamp_ms >= start_ms && e.timestamp_ms < end_ms)
            .cloned()
            .collect()
    }

    pub fn stress_events_between(&self, start_ms: i64, end_ms: i64) -> Vec<StressEvent> {
        self.stress_events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.detected_at_ms >= start_ms && e.detected_at_ms < end_ms)
            .cloned()
            .collect()
    }

    pub fn snapshots_between(&self, start_ms: i64, end_ms: i64) -> Vec<PortfolioSnapshot> {
        self.portfolio_metrics
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.timestamp_ms >= start_ms && s.timestamp_ms < end_ms)
            .cloned()
            .collect()
    }

    pub fn emergency_event_count(&self) -> usize {
        self.emergency_events.lock().unwrap().len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.portfolio_metrics.lock().unwrap().len()
    }
}

impl PersistenceSink for MemorySink {
    fn append_emergency_event(&self, event: &EmergencyEvent) -> Result<()> {
        self.emergency_events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn append_stress_event(&self, event: &StressEvent) -> Result<()> {
        self.stress_events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn append_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        self.portfolio_metrics.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

/// Notification sink that only logs. Real delivery fan-out lives outside
/// this crate.
#[derive(Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify_signal(&self, result: &ConfluenceResult) {
        log::info!(
            "[{}] {} ({}, score {:.3}, RR {:.2})",
            result.pair,
            result.recommended_action,
            result.confluence_strength,
            result.confluence_score,
            result.risk_reward_ratio
        );
    }

    fn notify_emergency(&self, event: &EmergencyEvent) {
        log::warn!(
            "Emergency level {} -> {} at drawdown {:.1}% ({})",
            event.previous_level,
            event.new_level,
            event.drawdown_pct * 100.0,
            event.protocol_description
        );
    }

    fn notify_stress(&self, event: &StressEvent) {
        log::warn!(
            "Stress event {} (severity {:.2}) affecting {:?}",
            event.event_type,
            event.severity,
            event.affected_pairs
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::emergency::EmergencyLevel;

    fn snapshot(ts: i64) -> PortfolioSnapshot {
        PortfolioSnapshot {
            portfolio_value: 1000.0,
            peak_value: 1000.0,
            drawdown_pct: 0.0,
            emergency_level: EmergencyLevel::Normal,
            position_size_multiplier: 1.0,
            trading_halted: false,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn range_queries_are_half_open() {
        let sink = MemorySink::new();
        for ts in [10, 20, 30] {
            sink.append_portfolio_snapshot(&snapshot(ts)).unwrap();
        }
        let hits = sink.snapshots_between(10, 30);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].timestamp_ms, 10);
        assert_eq!(hits[1].timestamp_ms, 20);
    }

    #[tokio::test]
    async fn memory_source_serves_tail() {
        let mut source = MemorySource::new();
        let candles: Vec<Candle> = (0..10)
            .map(|i| Candle::new(i, 1.0, 2.0, 0.5, 1.5, 10.0))
            .collect();
        source.insert("BTCUSDT", Timeframe::Daily, candles);
        let got = source
            .get_candles("BTCUSDT", Timeframe::Daily, 4)
            .await
            .unwrap();
        assert_eq!(got.len(), 4);
        assert_eq!(got[0].open_time_ms, 6);
    }
}
