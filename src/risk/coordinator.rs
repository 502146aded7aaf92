use std::collections::HashMap;

use crate::config::SizingConfig;
use crate::models::confluence::{ConfluenceResult, RecommendedAction};
use crate::models::decision::{
    OpenPosition, PositionDirection, PositionSizeDecision, RejectReason,
};
use crate::models::emergency::EmergencyStatus;

use super::correlation::{CorrelationRiskManager, ExposureCheck};

/// Pure sizing arithmetic. Separated from the coordinator so the shrink-only
/// property is trivially testable.
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Unconstrained size: the amount risked per trade divided by the stop
    /// distance. Every later adjustment can only shrink this.
    pub fn raw_size(&self, account_balance: f64, entry: f64, stop_loss: f64) -> Option<f64> {
        let stop_distance = (entry - stop_loss).abs();
        if stop_distance <= 0.0 || account_balance <= 0.0 {
            return None;
        }
        Some(account_balance * self.config.risk_per_trade / stop_distance)
    }

    pub fn min_position_size(&self) -> f64 {
        self.config.min_position_size
    }

    pub fn conflict_confidence_margin(&self) -> f64 {
        self.config.conflict_confidence_margin
    }
}

/// The final gate. Owns no persistent state - it combines read-only views of
/// the emergency and correlation managers into one decision per candidate.
pub struct PortfolioCoordinator {
    sizer: PositionSizer,
}

impl PortfolioCoordinator {
    pub fn new(config: SizingConfig) -> Self {
        Self {
            sizer: PositionSizer::new(config),
        }
    }

    /// Decide a position size for one candidate signal. Checks run in fixed
    /// order so the rejection reason is always the earliest gate that failed:
    /// halt, risk/reward, correlated exposure, minimum size.
    pub fn request_position(
        &self,
        signal: &ConfluenceResult,
        status: &EmergencyStatus,
        correlation: &CorrelationRiskManager,
        account_balance: f64,
        open_positions: &[OpenPosition],
        now_ms: i64,
    ) -> PositionSizeDecision {
        // 1. Nothing trades through a halt, full stop.
        if status.trading_halted {
            log::info!("[{}] rejected: trading halted", signal.pair);
            return PositionSizeDecision::rejected(&signal.pair, RejectReason::Halted);
        }

        let Some(direction) = direction_of(signal) else {
            // A Hold carries no directional intent; there is nothing to size.
            return PositionSizeDecision {
                pair: signal.pair.clone(),
                approved: false,
                size: 0.0,
                reason: None,
            };
        };

        // 2. The current emergency level sets the conviction bar.
        if signal.risk_reward_ratio < status.minimum_required_risk_reward {
            log::info!(
                "[{}] rejected: RR {:.2} below required {:.2}",
                signal.pair,
                signal.risk_reward_ratio,
                status.minimum_required_risk_reward
            );
            return PositionSizeDecision::rejected(
                &signal.pair,
                RejectReason::InsufficientRiskReward,
            );
        }

        // 3/4. Unconstrained size, then the correlation gate on its notional.
        let Some(raw_size) = self.sizer.raw_size(account_balance, signal.entry, signal.stop_loss)
        else {
            return PositionSizeDecision::rejected(&signal.pair, RejectReason::BelowMinSize);
        };

        let proposed_exposure = raw_size * signal.entry;
        let mut size = raw_size;
        match correlation.exposure_check(
            &signal.pair,
            direction,
            proposed_exposure,
            open_positions,
            account_balance,
            now_ms,
        ) {
            ExposureCheck::Approved => {}
            ExposureCheck::Downsized { allowed_exposure } => {
                size = (allowed_exposure / signal.entry).min(raw_size);
                log::info!(
                    "[{}] downsized by correlation cap: {:.6} -> {:.6}",
                    signal.pair,
                    raw_size,
                    size
                );
            }
            ExposureCheck::Rejected {
                correlated_exposure,
            } => {
                log::info!(
                    "[{}] rejected: correlated exposure {:.2} already at cap",
                    signal.pair,
                    correlated_exposure
                );
                return PositionSizeDecision::rejected(&signal.pair, RejectReason::ExposureCap);
            }
        }

        // 5. Emergency multiplier. Multipliers only ever shrink.
        size *= status.position_size_multiplier;

        // 6. Never round up past the intended risk.
        if size < self.sizer.min_position_size() || size <= 0.0 {
            log::info!(
                "[{}] rejected: size {:.8} below instrument minimum",
                signal.pair,
                size
            );
            return PositionSizeDecision::rejected(&signal.pair, RejectReason::BelowMinSize);
        }

        PositionSizeDecision::approved(&signal.pair, size)
    }

    /// Resolve one cycle's candidates before sizing: opposing signals on the
    /// same pair net to zero unless one side's confidence clears the other by
    /// the configured margin, in which case the winner survives and the loser
    /// is discarded with a logged reason.
    ///
    /// Returns the surviving candidates plus ready-made decisions for the
    /// discarded ones.
    pub fn resolve_conflicts<'a>(
        &self,
        candidates: &[&'a ConfluenceResult],
    ) -> (Vec<&'a ConfluenceResult>, Vec<PositionSizeDecision>) {
        let mut by_pair: HashMap<&str, Vec<&'a ConfluenceResult>> = HashMap::new();
        for &candidate in candidates {
            by_pair.entry(&candidate.pair).or_default().push(candidate);
        }

        let mut survivors = Vec::new();
        let mut discarded = Vec::new();

        for (pair, group) in by_pair {
            let best_buy = group
                .iter()
                .copied()
                .filter(|c| c.recommended_action == RecommendedAction::Buy)
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
            let best_sell = group
                .iter()
                .copied()
                .filter(|c| c.recommended_action == RecommendedAction::Sell)
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

            let (Some(best_buy), Some(best_sell)) = (best_buy, best_sell) else {
                // No opposition on this pair
                survivors.extend(group.iter().copied());
                continue;
            };

            let margin = self.sizer.conflict_confidence_margin();
            let gap = (best_buy.confidence - best_sell.confidence).abs();
            if gap > margin {
                let (winner, loser) = if best_buy.confidence > best_sell.confidence {
                    (best_buy, best_sell)
                } else {
                    (best_sell, best_buy)
                };
                log::info!(
                    "[{}] conflict: {} (confidence {:.2}) beats {} ({:.2}) by more than {:.2}",
                    pair,
                    winner.recommended_action,
                    winner.confidence,
                    loser.recommended_action,
                    loser.confidence,
                    margin
                );
                survivors.push(winner);
                discarded.push(PositionSizeDecision::rejected(
                    pair,
                    RejectReason::ConflictDiscarded,
                ));
            } else {
                log::info!(
                    "[{}] conflict: opposing signals within margin ({:.2} vs {:.2}), netting to zero",
                    pair,
                    best_buy.confidence,
                    best_sell.confidence
                );
                discarded.push(PositionSizeDecision::rejected(
                    pair,
                    RejectReason::ConflictDiscarded,
                ));
                discarded.push(PositionSizeDecision::rejected(
                    pair,
                    RejectReason::ConflictDiscarded,
                ));
            }
            // Any remaining same-pair candidates beyond the two leaders were
            // never in contention this cycle
        }

        (survivors, discarded)
    }
}

fn direction_of(signal: &ConfluenceResult) -> Option<PositionDirection> {
    match signal.recommended_action {
        RecommendedAction::Buy => Some(PositionDirection::Long),
        RecommendedAction::Sell => Some(PositionDirection::Short),
        RecommendedAction::Hold => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorrelationConfig, SizingConfig};
    use crate::domain::timeframe::Timeframe;
    use crate::models::confluence::{
        ConfluenceStrength, TimeframeAnalysis, TrendDirection,
    };
    use crate::models::emergency::EmergencyLevel;

    fn analysis(tf: Timeframe) -> TimeframeAnalysis {
        TimeframeAnalysis {
            timeframe: tf,
            trend_direction: TrendDirection::Up,
            signal_strength: 0.8,
        }
    }

    fn signal(pair: &str, action: RecommendedAction, confidence: f64) -> ConfluenceResult {
        ConfluenceResult {
            pair: pair.to_string(),
            weekly: analysis(Timeframe::Weekly),
            daily: analysis(Timeframe::Daily),
            h4: analysis(Timeframe::H4),
            confluence_score: 0.8,
            confluence_strength: ConfluenceStrength::VeryStrong,
            recommended_action: action,
            entry: 100.0,
            stop_loss: 95.0,
            take_profit: 110.0,
            risk_reward_ratio: 2.0,
            confidence,
            computed_at_ms: 0,
        }
    }

    fn normal_status() -> EmergencyStatus {
        EmergencyStatus {
            emergency_level: EmergencyLevel::Normal,
            drawdown_pct: 0.0,
            position_size_multiplier: 1.0,
            trading_halted: false,
            minimum_required_risk_reward: 1.5,
            active_stress_events: Vec::new(),
        }
    }

    fn halted_status() -> EmergencyStatus {
        EmergencyStatus {
            emergency_level: EmergencyLevel::Halt,
            drawdown_pct: 0.3,
            position_size_multiplier: 0.0,
            trading_halted: true,
            minimum_required_risk_reward: 3.0,
            active_stress_events: Vec::new(),
        }
    }

    fn coordinator() -> PortfolioCoordinator {
        PortfolioCoordinator::new(SizingConfig::default())
    }

    fn empty_correlation() -> CorrelationRiskManager {
        CorrelationRiskManager::new(CorrelationConfig::default())
    }

    #[test]
    fn never_approves_while_halted() {
        let coordinator = coordinator();
        let correlation = empty_correlation();
        // Maximum-conviction signal, still refused
        let candidate = signal("BTCUSDT", RecommendedAction::Buy, 1.0);
        let decision = coordinator.request_position(
            &candidate,
            &halted_status(),
            &correlation,
            100_000.0,
            &[],
            0,
        );
        assert!(!decision.approved);
        assert_eq!(decision.reason, Some(RejectReason::Halted));
    }

    #[test]
    fn rejects_insufficient_risk_reward() {
        let coordinator = coordinator();
        let correlation = empty_correlation();
        let mut status = normal_status();
        status.minimum_required_risk_reward = 2.5;
        let candidate = signal("BTCUSDT", RecommendedAction::Buy, 0.9); // RR 2.0
        let decision = coordinator.request_position(
            &candidate,
            &status,
            &correlation,
            100_000.0,
            &[],
            0,
        );
        assert_eq!(decision.reason, Some(RejectReason::InsufficientRiskReward));
    }

    #[test]
    fn approved_size_never_exceeds_raw_size() {
        let coordinator = coordinator();
        let correlation = empty_correlation();
        let candidate = signal("BTCUSDT", RecommendedAction::Buy, 0.9);
        let balance = 100_000.0;
        // raw = 100k * 0.01 / 5 = 200 units
        let raw = 200.0;

        for multiplier in [1.0, 0.5, 0.25] {
            let mut status = normal_status();
            status.position_size_multiplier = multiplier;
            let decision = coordinator.request_position(
                &candidate,
                &status,
                &correlation,
                balance,
                &[],
                0,
            );
            assert!(decision.approved);
            assert!(decision.size <= raw + 1e-9);
            assert!((decision.size - raw * multiplier).abs() < 1e-9);
        }
    }

    #[test]
    fn shrunk_below_minimum_is_rejected_not_rounded_up() {
        let config = SizingConfig {
            min_position_size: 150.0,
            ..SizingConfig::default()
        };
        let coordinator = PortfolioCoordinator::new(config);
        let correlation = empty_correlation();
        let mut status = normal_status();
        status.position_size_multiplier = 0.5; // raw 200 -> 100 < 150
        let candidate = signal("BTCUSDT", RecommendedAction::Buy, 0.9);
        let decision = coordinator.request_position(
            &candidate,
            &status,
            &correlation,
            100_000.0,
            &[],
            0,
        );
        assert_eq!(decision.reason, Some(RejectReason::BelowMinSize));
    }

    #[test]
    fn empty_correlation_state_fails_safe_to_exposure_cap() {
        // A fresh manager has an empty matrix: every open same-direction
        // position counts against the cap.
        let coordinator = coordinator();
        let correlation = empty_correlation();
        let open = vec![OpenPosition {
            pair: "ETHUSDT".to_string(),
            direction: PositionDirection::Long,
            exposure: 25_000.0, // the whole cap on a 100k book
            opened_at_ms: 0,
        }];
        let candidate = signal("BTCUSDT", RecommendedAction::Buy, 0.9);
        let decision = coordinator.request_position(
            &candidate,
            &normal_status(),
            &correlation,
            100_000.0,
            &open,
            0,
        );
        assert_eq!(decision.reason, Some(RejectReason::ExposureCap));
    }

    #[test]
    fn hold_signal_is_never_sized() {
        let coordinator = coordinator();
        let correlation = empty_correlation();
        let candidate = signal("BTCUSDT", RecommendedAction::Hold, 0.9);
        let decision = coordinator.request_position(
            &candidate,
            &normal_status(),
            &correlation,
            100_000.0,
            &[],
            0,
        );
        assert!(!decision.approved);
        assert_eq!(decision.size, 0.0);
    }

    #[test]
    fn opposing_signals_within_margin_net_to_zero() {
        let coordinator = coordinator();
        let buy = signal("BTCUSDT", RecommendedAction::Buy, 0.60);
        let sell = signal("BTCUSDT", RecommendedAction::Sell, 0.55);
        let (survivors, discarded) = coordinator.resolve_conflicts(&[&buy, &sell]);
        assert!(survivors.is_empty());
        assert_eq!(discarded.len(), 2);
        assert!(
            discarded
                .iter()
                .all(|d| d.reason == Some(RejectReason::ConflictDiscarded))
        );
    }

    #[test]
    fn confident_signal_wins_conflict_beyond_margin() {
        let coordinator = coordinator();
        let buy = signal("BTCUSDT", RecommendedAction::Buy, 0.90);
        let sell = signal("BTCUSDT", RecommendedAction::Sell, 0.50);
        let (survivors, discarded) = coordinator.resolve_conflicts(&[&buy, &sell]);
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].recommended_action, RecommendedAction::Buy);
        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].reason, Some(RejectReason::ConflictDiscarded));
    }

    #[test]
    fn unopposed_signals_pass_through_untouched() {
        let coordinator = coordinator();
        let buy_btc = signal("BTCUSDT", RecommendedAction::Buy, 0.9);
        let sell_eth = signal("ETHUSDT", RecommendedAction::Sell, 0.8);
        let (survivors, discarded) = coordinator.resolve_conflicts(&[&buy_btc, &sell_eth]);
        assert_eq!(survivors.len(), 2);
        assert!(discarded.is_empty());
    }
}
