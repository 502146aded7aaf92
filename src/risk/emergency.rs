use std::sync::Arc;

use itertools::Itertools;

use crate::analysis::indicators::realized_volatility;
use crate::config::{DEBUG_FLAGS, EmergencyConfig};
use crate::data::PersistenceSink;
use crate::models::emergency::{
    EmergencyEvent, EmergencyLevel, EmergencyStatus, PairMarketSnapshot, PortfolioSnapshot,
    StressEvent, StressEventType,
};
use crate::utils::maths_utils;

/// The portfolio drawdown state machine plus the independent stress-event
/// detector.
///
/// Exclusively owns the snapshot/event history; everything else reads state
/// through `get_emergency_status()`. Escalation needs a minimum run of
/// agreeing observations (one bad print is not a crisis), de-escalation
/// additionally needs the recovery to hold for the configured dwell time.
pub struct EmergencyRiskManager {
    config: EmergencyConfig,

    emergency_level: EmergencyLevel,
    peak_value: f64,
    current_value: f64,
    current_drawdown: f64,

    /// Idempotence guard: observations at or before this are discarded
    last_applied_timestamp_ms: Option<i64>,
    last_transition_ms: Option<i64>,

    /// Escalation debounce: (candidate level, consecutive agreeing count)
    escalation_candidate: Option<(EmergencyLevel, u32)>,
    /// De-escalation hysteresis: (candidate level, first qualifying observation)
    recovery_candidate: Option<(EmergencyLevel, i64)>,

    active_stress_events: Vec<StressEvent>,

    sink: Arc<dyn PersistenceSink>,

    // Drop/fault accounting - exposed for telemetry, never acted on
    stale_updates_discarded: u64,
    persistence_failures: u64,
}

impl EmergencyRiskManager {
    pub fn new(config: EmergencyConfig, sink: Arc<dyn PersistenceSink>) -> Self {
        Self {
            config,
            emergency_level: EmergencyLevel::Normal,
            peak_value: 0.0,
            current_value: 0.0,
            current_drawdown: 0.0,
            last_applied_timestamp_ms: None,
            last_transition_ms: None,
            escalation_candidate: None,
            recovery_candidate: None,
            active_stress_events: Vec::new(),
            sink,
            stale_updates_discarded: 0,
            persistence_failures: 0,
        }
    }

    /// Apply one portfolio value observation.
    ///
    /// Observations are applied strictly in timestamp order; anything at or
    /// before the last applied timestamp is discarded (idempotent under
    /// replay/duplication). Returns the transition event if the observation
    /// changed the emergency level.
    pub fn update_portfolio_value(
        &mut self,
        value: f64,
        observed_at_ms: i64,
    ) -> Option<EmergencyEvent> {
        if let Some(last) = self.last_applied_timestamp_ms
            && observed_at_ms <= last
        {
            self.stale_updates_discarded += 1;
            log::debug!(
                "Discarding stale portfolio observation at {} (last applied {})",
                observed_at_ms,
                last
            );
            return None;
        }
        if !value.is_finite() || value <= 0.0 {
            self.stale_updates_discarded += 1;
            log::warn!("Discarding non-positive portfolio value {}", value);
            return None;
        }
        self.last_applied_timestamp_ms = Some(observed_at_ms);

        // Peak never decreases
        self.peak_value = self.peak_value.max(value);
        self.current_value = value;
        self.current_drawdown = if self.peak_value > 0.0 {
            (self.peak_value - value) / self.peak_value
        } else {
            0.0
        };

        if DEBUG_FLAGS.print_portfolio_observations {
            log::info!(
                "Portfolio {} at {} (peak {}, drawdown {:.2}%)",
                value,
                observed_at_ms,
                self.peak_value,
                self.current_drawdown * 100.0
            );
        }

        let candidate = self.config.level_for_drawdown(self.current_drawdown);
        let event = self.consider_transition(candidate, observed_at_ms);

        self.append_snapshot(observed_at_ms);
        event
    }

    fn consider_transition(
        &mut self,
        candidate: EmergencyLevel,
        observed_at_ms: i64,
    ) -> Option<EmergencyEvent> {
        if candidate == self.emergency_level {
            // Holding steady clears any half-formed escalation or recovery
            self.escalation_candidate = None;
            self.recovery_candidate = None;
            return None;
        }

        if candidate > self.emergency_level {
            // Escalating. Immediate once the consecutive-observation
            // requirement is met - no dwell in this direction.
            self.recovery_candidate = None;
            let count = match self.escalation_candidate {
                Some((level, n)) if level == candidate => n + 1,
                _ => 1,
            };
            self.escalation_candidate = Some((candidate, count));
            if count >= self.config.min_consecutive_breaches {
                return Some(self.transition(candidate, observed_at_ms));
            }
            return None;
        }

        // Recovering. The candidate must hold for the dwell time, measured
        // from its first qualifying observation.
        self.escalation_candidate = None;
        let since = match self.recovery_candidate {
            Some((level, since)) if level == candidate => since,
            _ => observed_at_ms,
        };
        self.recovery_candidate = Some((candidate, since));
        if observed_at_ms - since >= self.config.deescalation_dwell_ms {
            return Some(self.transition(candidate, observed_at_ms));
        }
        None
    }

    fn transition(&mut self, new_level: EmergencyLevel, timestamp_ms: i64) -> EmergencyEvent {
        let protocol = self.config.protocol(new_level);
        let event = EmergencyEvent {
            previous_level: self.emergency_level,
            new_level,
            drawdown_pct: self.current_drawdown,
            protocol_description: format!(
                "size multiplier {}, min RR {}, halted: {}",
                protocol.position_size_multiplier,
                protocol.minimum_required_risk_reward,
                protocol.trading_halted
            ),
            timestamp_ms,
        };

        log::warn!(
            "Emergency level {} -> {} (drawdown {:.2}%)",
            event.previous_level,
            event.new_level,
            event.drawdown_pct * 100.0
        );

        self.emergency_level = new_level;
        self.last_transition_ms = Some(timestamp_ms);
        self.escalation_candidate = None;
        self.recovery_candidate = None;

        if let Err(e) = self.sink.append_emergency_event(&event) {
            self.persistence_failures += 1;
            log::error!("Failed to persist emergency event: {:#}", e);
        }
        event
    }

    fn append_snapshot(&mut self, timestamp_ms: i64) {
        let protocol = self.config.protocol(self.emergency_level);
        let snapshot = PortfolioSnapshot {
            portfolio_value: self.current_value,
            peak_value: self.peak_value,
            drawdown_pct: self.current_drawdown,
            emergency_level: self.emergency_level,
            position_size_multiplier: protocol.position_size_multiplier,
            trading_halted: protocol.trading_halted,
            timestamp_ms,
        };
        if let Err(e) = self.sink.append_portfolio_snapshot(&snapshot) {
            self.persistence_failures += 1;
            log::error!("Failed to persist portfolio snapshot: {:#}", e);
        }
    }

    /// Scan per-pair market snapshots for abnormal conditions, independent of
    /// portfolio P&L. Newly detected events join the active set (and are
    /// persisted fire-and-forget); expired ones age out by TTL.
    pub fn monitor_stress_events(
        &mut self,
        snapshots: &[PairMarketSnapshot],
        now_ms: i64,
    ) -> Vec<StressEvent> {
        self.active_stress_events
            .retain(|e| e.detected_at_ms + self.config.stress_ttl_ms > now_ms);

        let mut detected = Vec::new();

        for snapshot in snapshots {
            if let Some(event) = self.check_volatility_spike(snapshot) {
                detected.push(event);
            }
            if let Some(event) = self.check_liquidity_gap(snapshot) {
                detected.push(event);
            }
        }
        if let Some(event) = self.check_correlation_breakdown(snapshots, now_ms) {
            detected.push(event);
        }

        for event in &detected {
            log::warn!(
                "Stress event {} (severity {:.2}) on {:?}",
                event.event_type,
                event.severity,
                event.affected_pairs
            );
            if let Err(e) = self.sink.append_stress_event(event) {
                self.persistence_failures += 1;
                log::error!("Failed to persist stress event: {:#}", e);
            }
            self.active_stress_events.push(event.clone());
        }
        detected
    }

    fn check_volatility_spike(&self, snapshot: &PairMarketSnapshot) -> Option<StressEvent> {
        let closes = &snapshot.closes;
        if closes.len() <= self.config.stress_vol_window {
            return None;
        }
        let current = realized_volatility(closes, self.config.stress_vol_window)?;
        // Baseline deliberately excludes the current window, otherwise a
        // violent tail inflates its own threshold
        let history = &closes[..closes.len() - self.config.stress_vol_window];
        let baseline = realized_volatility(history, self.config.stress_baseline_window)?;
        if baseline <= 0.0 {
            return None;
        }
        let ratio = current / baseline;
        if ratio < self.config.stress_severity_factor {
            return None;
        }
        Some(StressEvent {
            event_type: StressEventType::VolatilitySpike,
            severity: ratio,
            affected_pairs: vec![snapshot.pair.clone()],
            recommended_action: "reduce position sizes until volatility normalizes".to_string(),
            detected_at_ms: snapshot.observed_at_ms,
        })
    }

    fn check_liquidity_gap(&self, snapshot: &PairMarketSnapshot) -> Option<StressEvent> {
        let [.., prev, last] = snapshot.closes[..] else {
            return None;
        };
        if prev <= 0.0 {
            return None;
        }
        let gap = (last / prev - 1.0).abs();
        if gap < self.config.stress_gap_pct {
            return None;
        }
        Some(StressEvent {
            event_type: StressEventType::LiquidityGap,
            severity: gap / self.config.stress_gap_pct,
            affected_pairs: vec![snapshot.pair.clone()],
            recommended_action: "widen stops and avoid market orders".to_string(),
            detected_at_ms: snapshot.observed_at_ms,
        })
    }

    /// Everything moving in lockstep is itself a stress signal: when average
    /// |pairwise correlation| across the universe pins near 1, diversification
    /// is gone.
    fn check_correlation_breakdown(
        &self,
        snapshots: &[PairMarketSnapshot],
        now_ms: i64,
    ) -> Option<StressEvent> {
        if snapshots.len() < 2 {
            return None;
        }
        let returns: Vec<Vec<f64>> = snapshots
            .iter()
            .map(|s| maths_utils::log_returns(&s.closes))
            .collect();

        let mut total = 0.0;
        let mut pairs_counted = 0usize;
        for (a, b) in returns.iter().tuple_combinations() {
            let n = a.len().min(b.len());
            if n < 2 {
                continue;
            }
            if let Some(r) = maths_utils::pearson(&a[a.len() - n..], &b[b.len() - n..]) {
                total += r.abs();
                pairs_counted += 1;
            }
        }
        if pairs_counted == 0 {
            return None;
        }
        let average = total / pairs_counted as f64;
        if average < self.config.stress_correlation_level {
            return None;
        }
        Some(StressEvent {
            event_type: StressEventType::CorrelationBreakdown,
            severity: average / self.config.stress_correlation_level,
            affected_pairs: snapshots.iter().map(|s| s.pair.clone()).collect(),
            recommended_action: "treat the whole book as a single exposure".to_string(),
            detected_at_ms: now_ms,
        })
    }

    /// Pure, side-effect-free read of the full risk posture.
    pub fn get_emergency_status(&self) -> EmergencyStatus {
        let protocol = self.config.protocol(self.emergency_level);
        EmergencyStatus {
            emergency_level: self.emergency_level,
            drawdown_pct: self.current_drawdown,
            position_size_multiplier: protocol.position_size_multiplier,
            trading_halted: protocol.trading_halted,
            minimum_required_risk_reward: protocol.minimum_required_risk_reward,
            active_stress_events: self.active_stress_events.clone(),
        }
    }

    pub fn emergency_level(&self) -> EmergencyLevel {
        self.emergency_level
    }

    pub fn last_transition_ms(&self) -> Option<i64> {
        self.last_transition_ms
    }

    pub fn stale_updates_discarded(&self) -> u64 {
        self.stale_updates_discarded
    }

    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures
    }
}
