use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::analysis::{ConfluenceAnalyzer, ConfluenceOutcome};
use crate::config::{DEBUG_FLAGS, EngineConfig};
use crate::data::{NotificationSink, PersistenceSink};
use crate::models::confluence::ConfluenceResult;
use crate::models::decision::{OpenPosition, PositionSizeDecision};
use crate::models::emergency::{
    EmergencyEvent, EmergencyStatus, PairMarketSnapshot, StressEvent,
};
use crate::models::timeseries::TimeSeriesCollection;
use crate::risk::{CorrelationRiskManager, EmergencyRiskManager, PortfolioCoordinator};

use super::messages::{JobRequest, JobResult};
use super::state::PairState;
use super::worker;

/// Drop/fault accounting. Purely informational; nothing reads these to make
/// decisions.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct EngineCounters {
    pub not_ready: u64,
    pub dropped_signals: u64,
    pub conflicts_discarded: u64,
    pub stale_updates_discarded: u64,
    pub persistence_failures: u64,
}

/// The single logical owner of all shared risk state for one portfolio
/// scope.
///
/// Per-pair confluence analysis is stateless and runs on the worker thread
/// (or inline); everything that accounts - drawdown, exposure, the open
/// position ledger - is only ever touched through `&mut self`, so writers
/// can never interleave.
pub struct WardenEngine {
    /// Registry of all pairs
    pub pairs: HashMap<String, PairState>,

    /// Shared immutable data
    pub timeseries: Arc<TimeSeriesCollection>,

    analyzer: ConfluenceAnalyzer,
    emergency: EmergencyRiskManager,
    correlation: CorrelationRiskManager,
    coordinator: PortfolioCoordinator,
    notifier: Arc<dyn NotificationSink>,

    /// Worker Communication
    job_tx: Sender<JobRequest>,
    result_rx: Receiver<JobResult>,

    /// Queue Logic
    pub queue: VecDeque<String>,

    /// The Live Configuration State
    config: EngineConfig,

    account_balance: f64,
    open_positions: Vec<OpenPosition>,

    counters: EngineCounters,
}

impl WardenEngine {
    /// Initialize the engine and spawn the confluence worker. The config is
    /// validated here, once; a bad config never produces a running engine.
    pub fn new(
        config: EngineConfig,
        timeseries: TimeSeriesCollection,
        account_balance: f64,
        sink: Arc<dyn PersistenceSink>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        config.validate().context("Invalid engine configuration")?;

        let timeseries_arc = Arc::new(timeseries);
        let analyzer = ConfluenceAnalyzer::new(config.confluence.clone());

        let (job_tx, job_rx) = channel::<JobRequest>();
        let (result_tx, result_rx) = channel::<JobResult>();
        worker::spawn_worker_thread(analyzer.clone(), job_rx, result_tx);

        let mut pairs = HashMap::new();
        for pair in timeseries_arc.unique_pair_names() {
            pairs.insert(pair, PairState::new());
        }

        let emergency = EmergencyRiskManager::new(config.emergency.clone(), sink);
        let correlation = CorrelationRiskManager::new(config.correlation.clone());
        let coordinator = PortfolioCoordinator::new(config.sizing.clone());

        Ok(Self {
            pairs,
            timeseries: timeseries_arc,
            analyzer,
            emergency,
            correlation,
            coordinator,
            notifier,
            job_tx,
            result_rx,
            queue: VecDeque::new(),
            config,
            account_balance,
            open_positions: Vec::new(),
            counters: EngineCounters::default(),
        })
    }

    /// THE GAME LOOP.
    /// Returns TRUE if the engine is busy (queue not empty OR worker
    /// calculating), telling the caller to keep pumping.
    pub fn update(&mut self) -> bool {
        // 1. Process Results (Swap Buffers)
        while let Ok(result) = self.result_rx.try_recv() {
            self.handle_job_result(result);
        }

        // 2. Dispatch Jobs
        self.process_queue();

        // 3. Report Busy Status
        !self.queue.is_empty() || self.has_active_workers()
    }

    // --- EXPOSED OPERATIONS ---

    /// Evaluate one pair synchronously. "Not ready" and dropped signals come
    /// back as None - counted, logged, never an error.
    pub fn evaluate_pair(&mut self, pair: &str, now_ms: i64) -> Option<Arc<ConfluenceResult>> {
        let outcome = self.analyzer.evaluate(pair, &self.timeseries, now_ms);
        self.absorb_outcome(pair, outcome)
    }

    /// Apply a portfolio value observation to the drawdown state machine.
    pub fn update_portfolio_value(
        &mut self,
        value: f64,
        observed_at_ms: i64,
    ) -> Option<EmergencyEvent> {
        let event = self.emergency.update_portfolio_value(value, observed_at_ms);
        if let Some(ref event) = event {
            self.notifier.notify_emergency(event);
        }
        event
    }

    /// Run the stress detector over per-pair market snapshots.
    pub fn monitor_stress(
        &mut self,
        snapshots: &[PairMarketSnapshot],
        now_ms: i64,
    ) -> Vec<StressEvent> {
        let events = self.emergency.monitor_stress_events(snapshots, now_ms);
        for event in &events {
            self.notifier.notify_stress(event);
        }
        events
    }

    /// Size a single candidate signal through the full gate chain.
    pub fn request_position(
        &mut self,
        signal: &ConfluenceResult,
        now_ms: i64,
    ) -> PositionSizeDecision {
        self.correlation.maybe_recompute(now_ms);
        self.coordinator.request_position(
            signal,
            &self.emergency.get_emergency_status(),
            &self.correlation,
            self.account_balance,
            &self.open_positions,
            now_ms,
        )
    }

    /// Size one cycle's worth of candidates: conflicts are netted first, then
    /// each survivor runs the gate chain. Decisions for discarded signals are
    /// included in the output.
    pub fn request_positions(
        &mut self,
        signals: &[&ConfluenceResult],
        now_ms: i64,
    ) -> Vec<PositionSizeDecision> {
        let (survivors, discarded) = self.coordinator.resolve_conflicts(signals);
        self.counters.conflicts_discarded += discarded.len() as u64;

        let mut decisions = discarded;
        for signal in survivors {
            decisions.push(self.request_position(signal, now_ms));
        }
        decisions
    }

    /// Pure read of the current risk posture.
    pub fn get_status(&self) -> EmergencyStatus {
        self.emergency.get_emergency_status()
    }

    // --- PRICE / LEDGER FEEDS ---

    /// Feed a live price observation: updates the correlation windows and
    /// queues a re-analysis if the pair moved beyond the trigger threshold.
    pub fn observe_price(&mut self, pair: &str, price: f64, observed_at_ms: i64) {
        self.correlation.record_price(pair, price, observed_at_ms);

        let Some(state) = self.pairs.get_mut(pair) else {
            return;
        };
        if state.is_calculating || self.queue.contains(&pair.to_string()) {
            return;
        }

        // Handle startup (0.0)
        if state.last_update_price == 0.0 {
            state.last_update_price = price;
            self.queue.push_back(pair.to_string());
            return;
        }

        let threshold = self.config.sizing.price_recalc_threshold_pct;
        let pct_diff = (price - state.last_update_price).abs() / state.last_update_price;
        if pct_diff >= threshold {
            if DEBUG_FLAGS.print_engine_events {
                log::info!("[{}] Trigger: price moved {:.4}%", pair, pct_diff * 100.0);
            }
            state.last_update_price = price;
            self.queue.push_back(pair.to_string());
        }
    }

    /// Record a fill into the open-position ledger.
    pub fn open_position(&mut self, position: OpenPosition) {
        self.open_positions.retain(|p| p.pair != position.pair);
        self.open_positions.push(position);
    }

    /// Remove a pair's position from the ledger (close/flatten).
    pub fn close_position(&mut self, pair: &str) -> Option<OpenPosition> {
        let idx = self.open_positions.iter().position(|p| p.pair == pair)?;
        Some(self.open_positions.remove(idx))
    }

    pub fn open_positions(&self) -> &[OpenPosition] {
        &self.open_positions
    }

    pub fn set_account_balance(&mut self, balance: f64) {
        self.account_balance = balance;
    }

    // --- TELEMETRY ---

    pub fn counters(&self) -> EngineCounters {
        let mut counters = self.counters;
        counters.stale_updates_discarded = self.emergency.stale_updates_discarded();
        counters.persistence_failures = self.emergency.persistence_failures();
        counters
    }

    pub fn get_queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn get_active_pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn get_worker_status_msg(&self) -> Option<String> {
        let calculating_pair = self
            .pairs
            .iter()
            .find(|(_, state)| state.is_calculating)
            .map(|(name, _)| name.clone());

        if let Some(pair) = calculating_pair {
            Some(format!("Processing {}", pair))
        } else if !self.queue.is_empty() {
            Some(format!("Queued: {}", self.queue.len()))
        } else {
            None
        }
    }

    /// Latest front-buffer result for a pair, if any.
    pub fn get_result(&self, pair: &str) -> Option<Arc<ConfluenceResult>> {
        self.pairs.get(pair).and_then(|state| state.result.clone())
    }

    /// Force a single recalc (e.g. operator request). Front of the queue,
    /// deduplicated.
    pub fn force_recalc(&mut self, pair: &str) {
        let is_calculating = self
            .pairs
            .get(pair)
            .map(|s| s.is_calculating)
            .unwrap_or(false);
        let in_queue = self.queue.contains(&pair.to_string());
        if !is_calculating && !in_queue {
            self.queue.push_front(pair.to_string());
        }
    }

    // --- INTERNAL LOGIC ---

    fn has_active_workers(&self) -> bool {
        self.pairs.values().any(|s| s.is_calculating)
    }

    fn absorb_outcome(
        &mut self,
        pair: &str,
        outcome: ConfluenceOutcome,
    ) -> Option<Arc<ConfluenceResult>> {
        match outcome {
            ConfluenceOutcome::Ready(result) => {
                if let Some(state) = self.pairs.get_mut(pair) {
                    state.update_buffer(result.clone());
                }
                if result.is_actionable() {
                    self.notifier.notify_signal(&result);
                }
                Some(result)
            }
            ConfluenceOutcome::NotReady {
                timeframe,
                have,
                need,
            } => {
                self.counters.not_ready += 1;
                log::debug!(
                    "[{}] not ready: {} has {}/{} candles",
                    pair,
                    timeframe.label(),
                    have,
                    need
                );
                if let Some(state) = self.pairs.get_mut(pair) {
                    state.is_calculating = false;
                }
                None
            }
            ConfluenceOutcome::Dropped { why } => {
                self.counters.dropped_signals += 1;
                log::debug!("[{}] signal dropped: {}", pair, why);
                if let Some(state) = self.pairs.get_mut(pair) {
                    state.is_calculating = false;
                    state.last_error = Some(why);
                }
                None
            }
        }
    }

    fn handle_job_result(&mut self, result: JobResult) {
        if DEBUG_FLAGS.print_engine_events {
            log::info!(
                "[{}] worker finished in {}ms",
                result.pair_name,
                result.duration_ms
            );
        }
        let pair = result.pair_name.clone();
        self.absorb_outcome(&pair, result.outcome);
    }

    fn process_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }

        // Peek at front: if it's mid-calculation, wait (single worker)
        if let Some(pair) = self.queue.front()
            && let Some(state) = self.pairs.get(pair)
            && state.is_calculating
        {
            return;
        }

        if let Some(pair) = self.queue.pop_front() {
            self.dispatch_job(pair);
        }
    }

    fn dispatch_job(&mut self, pair: String) {
        if let Some(state) = self.pairs.get_mut(&pair) {
            state.is_calculating = true;
            let req = JobRequest {
                pair_name: pair,
                now_ms: crate::utils::time_utils::local_now_as_timestamp_ms(),
                timeseries: self.timeseries.clone(),
            };
            // Send to worker. If the receiver is dead we ignore the error
            // (engine shutting down).
            let _ = self.job_tx.send(req);
        }
    }
}
