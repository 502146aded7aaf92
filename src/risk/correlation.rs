use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use itertools::Itertools;

use crate::config::{CorrelationConfig, DEBUG_FLAGS};
use crate::models::correlation::{CorrelationAlert, CorrelationMatrix};
use crate::models::decision::{OpenPosition, PositionDirection};
use crate::utils::maths_utils;

/// Verdict of an exposure check. Downsizing hands back the largest exposure
/// that still fits under the cap; it is never larger than what was proposed.
#[derive(Debug, Clone, PartialEq)]
pub enum ExposureCheck {
    Approved,
    Downsized { allowed_exposure: f64 },
    Rejected { correlated_exposure: f64 },
}

/// Rolling cross-pair correlation and the exposure cap built on it.
///
/// Price ticks accumulate into per-pair return windows; the matrix itself is
/// recomputed on a fixed cadence and swapped in as one finished `Arc` -
/// readers can hold the previous matrix across a recompute and never observe
/// a partial update.
pub struct CorrelationRiskManager {
    config: CorrelationConfig,

    return_windows: HashMap<String, VecDeque<f64>>,
    last_prices: HashMap<String, f64>,

    matrix: Arc<CorrelationMatrix>,
    last_recompute_ms: Option<i64>,

    /// Informational breach-crossing log, bounded by config
    alerts: VecDeque<CorrelationAlert>,
}

impl CorrelationRiskManager {
    pub fn new(config: CorrelationConfig) -> Self {
        let window_size = config.window_size;
        Self {
            config,
            return_windows: HashMap::new(),
            last_prices: HashMap::new(),
            matrix: Arc::new(CorrelationMatrix::from_upper_triangle(
                Vec::new(),
                &HashMap::new(),
                window_size,
                0,
            )),
            last_recompute_ms: None,
            alerts: VecDeque::new(),
        }
    }

    /// Feed one price observation. Cheap: updates the rolling window and, if
    /// the recompute cadence has elapsed, triggers the batch swap.
    pub fn record_price(&mut self, pair: &str, price: f64, observed_at_ms: i64) {
        if !price.is_finite() || price <= 0.0 {
            return;
        }
        if let Some(&last) = self.last_prices.get(pair)
            && last > 0.0
        {
            let window = self
                .return_windows
                .entry(pair.to_string())
                .or_default();
            window.push_back((price / last).ln());
            while window.len() > self.config.window_size {
                window.pop_front();
            }
        }
        self.last_prices.insert(pair.to_string(), price);

        self.maybe_recompute(observed_at_ms);
    }

    /// Recompute the matrix if the cadence has elapsed. Also callable
    /// directly by the engine's game loop.
    pub fn maybe_recompute(&mut self, now_ms: i64) {
        let due = match self.last_recompute_ms {
            Some(last) => now_ms - last >= self.config.recompute_interval_ms,
            None => true,
        };
        if due && !self.return_windows.is_empty() {
            self.recompute(now_ms);
        }
    }

    fn recompute(&mut self, now_ms: i64) {
        let mut pairs: Vec<String> = self.return_windows.keys().cloned().collect();
        pairs.sort();

        let mut upper: HashMap<(usize, usize), f64> = HashMap::new();
        for ((i, pair_a), (j, pair_b)) in pairs.iter().enumerate().tuple_combinations() {
            let window_a = &self.return_windows[pair_a];
            let window_b = &self.return_windows[pair_b];
            // Insufficient history on either side: leave the entry out, the
            // matrix fills it with the fail-safe 1.0
            if window_a.len() < self.config.window_size
                || window_b.len() < self.config.window_size
            {
                continue;
            }
            let a: Vec<f64> = window_a.iter().copied().collect();
            let b: Vec<f64> = window_b.iter().copied().collect();
            if let Some(r) = maths_utils::pearson(&a, &b) {
                upper.insert((i, j), r);
            }
        }

        let fresh = Arc::new(CorrelationMatrix::from_upper_triangle(
            pairs,
            &upper,
            self.config.window_size,
            now_ms,
        ));

        self.log_breach_crossings(&fresh, now_ms);

        if DEBUG_FLAGS.print_correlation_recomputes {
            log::info!(
                "Correlation matrix recomputed over {} pairs at {}",
                fresh.len(),
                now_ms
            );
        }

        // The swap: one pointer store, readers keep whatever they held
        self.matrix = fresh;
        self.last_recompute_ms = Some(now_ms);
    }

    fn log_breach_crossings(&mut self, fresh: &CorrelationMatrix, now_ms: i64) {
        let threshold = self.config.breach_threshold;
        for (pair_a, pair_b) in fresh.pairs.iter().tuple_combinations() {
            let Some(new_coeff) = fresh.coefficient(pair_a, pair_b) else {
                continue;
            };
            let Some(old_coeff) = self.matrix.coefficient(pair_a, pair_b) else {
                continue;
            };
            let was_breached = old_coeff.abs() > threshold;
            let is_breached = new_coeff.abs() > threshold;
            if was_breached == is_breached {
                continue;
            }
            log::info!(
                "Correlation {}/{} crossed {} threshold: {:.3} -> {:.3}",
                pair_a,
                pair_b,
                threshold,
                old_coeff,
                new_coeff
            );
            self.alerts.push_back(CorrelationAlert {
                pair_a: pair_a.clone(),
                pair_b: pair_b.clone(),
                coefficient: new_coeff,
                threshold,
                crossed_above: is_breached,
                timestamp_ms: now_ms,
            });
            while self.alerts.len() > self.config.max_alerts_kept {
                self.alerts.pop_front();
            }
        }
    }

    /// Would adding `proposed_exposure` on `candidate_pair` push the
    /// correlated bucket past the cap?
    ///
    /// Fail-safe throughout: a stale or empty matrix, or a pair the matrix
    /// has never seen, counts as maximally correlated with everything.
    pub fn exposure_check(
        &self,
        candidate_pair: &str,
        direction: PositionDirection,
        proposed_exposure: f64,
        open_positions: &[OpenPosition],
        account_balance: f64,
        now_ms: i64,
    ) -> ExposureCheck {
        let cap = self.config.max_correlated_exposure * account_balance;

        let matrix_usable = !self.matrix.is_empty()
            && now_ms - self.matrix.computed_at_ms <= self.config.stale_after_ms;

        let correlated_exposure: f64 = open_positions
            .iter()
            .filter(|p| p.direction == direction)
            .filter(|p| {
                if !matrix_usable {
                    return true; // worst case: everything is one bucket
                }
                let coeff = self
                    .matrix
                    .coefficient(candidate_pair, &p.pair)
                    .unwrap_or(1.0);
                coeff.abs() > self.config.breach_threshold
            })
            .map(|p| p.exposure)
            .sum();

        let remaining = cap - correlated_exposure;
        if proposed_exposure <= remaining {
            ExposureCheck::Approved
        } else if remaining > 0.0 {
            ExposureCheck::Downsized {
                allowed_exposure: remaining,
            }
        } else {
            ExposureCheck::Rejected {
                correlated_exposure,
            }
        }
    }

    pub fn current_matrix(&self) -> Arc<CorrelationMatrix> {
        Arc::clone(&self.matrix)
    }

    pub fn alerts(&self) -> impl Iterator<Item = &CorrelationAlert> {
        self.alerts.iter()
    }
}
