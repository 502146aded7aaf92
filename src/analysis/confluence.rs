use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use crate::config::{ConfluenceConfig, DEBUG_FLAGS};
use crate::domain::timeframe::Timeframe;
use crate::models::confluence::{
    ConfluenceResult, ConfluenceStrength, RecommendedAction, TimeframeAnalysis, TrendDirection,
};
use crate::models::timeseries::{OhlcvTimeSeries, TimeSeriesCollection};
use crate::utils::maths_utils::clip01;

use super::indicators;

/// What a single evaluation produced. "Not ready" and "dropped" are normal
/// outcomes, not errors - the caller decides whether to count or log them.
#[derive(Debug, Clone)]
pub enum ConfluenceOutcome {
    Ready(Arc<ConfluenceResult>),
    /// Some timeframe is below its minimum lookback
    NotReady {
        timeframe: Timeframe,
        have: usize,
        need: usize,
    },
    /// The signal failed validation (degenerate ATR, RR below minimum)
    Dropped { why: String },
}

// --- The cache key struct ---
// Fingerprints the exact candle sets an evaluation saw: same candles in,
// same result out, so repeat evaluations of unchanged data are free.
#[derive(Clone, Debug)]
struct CacheKey {
    pair: String,
    /// Per timeframe: (candle count, last open time, last close as bits)
    fingerprints: [(usize, i64, u64); 3],
}

impl Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.pair.hash(state);
        for fp in &self.fingerprints {
            fp.hash(state);
        }
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.pair == other.pair && self.fingerprints == other.fingerprints
    }
}

impl Eq for CacheKey {}

fn fingerprint(series: &OhlcvTimeSeries) -> (usize, i64, u64) {
    (
        series.klines(),
        series.last_kline_timestamp_ms(),
        series.last_close().unwrap_or(0.0).to_bits(),
    )
}

/// Per-pair trend fusion across weekly / daily / H4.
///
/// Stateless with respect to risk: the only held state is the result cache,
/// which is shared across clones (worker threads clone the analyzer, not the
/// cache contents).
pub struct ConfluenceAnalyzer {
    config: ConfluenceConfig,
    cache: Arc<Mutex<HashMap<CacheKey, Arc<ConfluenceResult>>>>,
}

impl Clone for ConfluenceAnalyzer {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            // Clone the Arc, not the HashMap - this shares the cache!
            cache: Arc::clone(&self.cache),
        }
    }
}

impl ConfluenceAnalyzer {
    pub fn new(config: ConfluenceConfig) -> Self {
        Self {
            config,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Evaluate one pair against the current candle collection.
    ///
    /// `now_ms` stamps the result; it plays no part in the analysis itself,
    /// so identical candle sets always produce identical scores.
    pub fn evaluate(
        &self,
        pair: &str,
        timeseries: &TimeSeriesCollection,
        now_ms: i64,
    ) -> ConfluenceOutcome {
        // Gather the three series; a missing series counts as zero candles.
        let mut series = Vec::with_capacity(3);
        for tf in [Timeframe::Weekly, Timeframe::Daily, Timeframe::H4] {
            match timeseries.get(pair, tf) {
                Ok(s) => {
                    if s.klines() < tf.min_lookback() {
                        return ConfluenceOutcome::NotReady {
                            timeframe: tf,
                            have: s.klines(),
                            need: tf.min_lookback(),
                        };
                    }
                    series.push(s);
                }
                Err(_) => {
                    return ConfluenceOutcome::NotReady {
                        timeframe: tf,
                        have: 0,
                        need: tf.min_lookback(),
                    };
                }
            }
        }
        let (weekly_series, daily_series, h4_series) = (series[0], series[1], series[2]);

        let key = CacheKey {
            pair: pair.to_string(),
            fingerprints: [
                fingerprint(weekly_series),
                fingerprint(daily_series),
                fingerprint(h4_series),
            ],
        };

        // --- Step 1: Try to get a lock and check if the key exists ---
        {
            if let Ok(cache) = self.cache.lock()
                && let Some(cached) = cache.get(&key)
            {
                if DEBUG_FLAGS.print_confluence_cache_events {
                    log::info!("Confluence cache HIT for {}", pair);
                }
                return ConfluenceOutcome::Ready(Arc::clone(cached));
            }
        } // Lock is released here.

        // --- Step 2: Not cached - run the analysis ---
        let result = match analyze_pair(
            &self.config,
            pair,
            weekly_series,
            daily_series,
            h4_series,
            now_ms,
        ) {
            Ok(result) => result,
            Err(why) => return ConfluenceOutcome::Dropped { why },
        };

        let arc_result = Arc::new(result);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, Arc::clone(&arc_result));
        }

        ConfluenceOutcome::Ready(arc_result)
    }

    /// Batch sweep over every pair in the collection. Per-pair analysis is
    /// pure, so the sweep parallelizes freely.
    pub fn evaluate_universe(
        &self,
        timeseries: &TimeSeriesCollection,
        now_ms: i64,
    ) -> Vec<(String, ConfluenceOutcome)> {
        timeseries
            .unique_pair_names()
            .into_par_iter()
            .map(|pair| {
                let outcome = self.evaluate(&pair, timeseries, now_ms);
                (pair, outcome)
            })
            .collect()
    }
}

/// Trend read for one timeframe: direction from the fast/slow EMA
/// relationship, strength from their normalized separation.
fn analyze_timeframe(
    config: &ConfluenceConfig,
    timeframe: Timeframe,
    series: &OhlcvTimeSeries,
) -> Option<TimeframeAnalysis> {
    let closes = &series.close_prices;
    let fast = indicators::ema(closes, config.fast_period)?;
    let slow = indicators::ema(closes, config.slow_period)?;
    if slow == 0.0 {
        return None;
    }

    let separation = (fast - slow) / slow;
    let trend_direction = if separation.abs() < config.sideways_band_pct {
        TrendDirection::Sideways
    } else if separation > 0.0 {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    };

    Some(TimeframeAnalysis {
        timeframe,
        trend_direction,
        signal_strength: clip01(separation.abs() * config.strength_scale),
    })
}

/// Outcome of direction fusion before banding.
struct Fusion {
    score: f64,
    majority: Option<TrendDirection>,
    confidence: f64,
}

/// Combine the three timeframe verdicts with fixed weights. Unanimous
/// agreement maximizes the score; a 2-vs-1 majority drops the dissenting
/// timeframe's contribution; no majority collapses the score to zero.
fn fuse(config: &ConfluenceConfig, analyses: [&TimeframeAnalysis; 3]) -> Fusion {
    let weights = [
        config.weekly_weight,
        config.daily_weight,
        config.h4_weight,
    ];

    let up_votes = analyses
        .iter()
        .filter(|a| a.trend_direction == TrendDirection::Up)
        .count();
    let down_votes = analyses
        .iter()
        .filter(|a| a.trend_direction == TrendDirection::Down)
        .count();

    let majority = if up_votes >= 2 {
        Some(TrendDirection::Up)
    } else if down_votes >= 2 {
        Some(TrendDirection::Down)
    } else {
        None
    };

    let Some(majority_dir) = majority else {
        return Fusion {
            score: 0.0,
            majority: None,
            confidence: 0.0,
        };
    };

    let score: f64 = analyses
        .iter()
        .zip(weights.iter())
        .filter(|(a, _)| a.trend_direction == majority_dir)
        .map(|(a, w)| a.signal_strength * w)
        .sum();

    let unanimous = up_votes == 3 || down_votes == 3;
    let agreement_factor = if unanimous { 1.0 } else { 0.75 };

    Fusion {
        score: clip01(score),
        majority: Some(majority_dir),
        confidence: clip01(score * agreement_factor),
    }
}

/// The full per-pair analysis. Err(reason) means the signal is dropped;
/// callers count it, nothing propagates.
fn analyze_pair(
    config: &ConfluenceConfig,
    pair: &str,
    weekly_series: &OhlcvTimeSeries,
    daily_series: &OhlcvTimeSeries,
    h4_series: &OhlcvTimeSeries,
    now_ms: i64,
) -> Result<ConfluenceResult, String> {
    let weekly = analyze_timeframe(config, Timeframe::Weekly, weekly_series)
        .ok_or("weekly trend read failed")?;
    let daily = analyze_timeframe(config, Timeframe::Daily, daily_series)
        .ok_or("daily trend read failed")?;
    let h4 =
        analyze_timeframe(config, Timeframe::H4, h4_series).ok_or("h4 trend read failed")?;

    let fusion = fuse(config, [&weekly, &daily, &h4]);
    let strength = ConfluenceStrength::from_score(fusion.score);

    let recommended_action = match fusion.majority {
        Some(TrendDirection::Up) if strength.is_actionable() => RecommendedAction::Buy,
        Some(TrendDirection::Down) if strength.is_actionable() => RecommendedAction::Sell,
        _ => RecommendedAction::Hold,
    };

    // Entry and stops come off the H4 series
    let entry = h4_series
        .last_close()
        .ok_or("h4 series has no closing price")?;
    let h4_candles = h4_series.tail_candles(config.atr_period + 1);
    let atr_value =
        indicators::atr(&h4_candles, config.atr_period).ok_or("not enough H4 candles for ATR")?;

    // Guard against unbounded stop distances: a near-zero true range would
    // put the stop on top of the entry
    if atr_value <= entry.abs() * config.min_atr_pct_of_price {
        return Err(format!(
            "degenerate ATR {:.3e} at entry {:.4} for {}",
            atr_value, entry, pair
        ));
    }

    let stop_distance = atr_value * config.atr_stop_mult;
    let target_distance = atr_value * config.atr_target_mult;
    // Hold results keep the long-side convention for level placement
    let (stop_loss, take_profit) = match recommended_action {
        RecommendedAction::Sell => (entry + stop_distance, entry - target_distance),
        _ => (entry - stop_distance, entry + target_distance),
    };

    let risk_reward_ratio = target_distance / stop_distance;
    if risk_reward_ratio < config.min_risk_reward {
        return Err(format!(
            "risk/reward {:.2} below configured minimum {:.2} for {}",
            risk_reward_ratio, config.min_risk_reward, pair
        ));
    }

    Ok(ConfluenceResult {
        pair: pair.to_string(),
        weekly,
        daily,
        h4,
        confluence_score: fusion.score,
        confluence_strength: strength,
        recommended_action,
        entry,
        stop_loss,
        take_profit,
        risk_reward_ratio,
        confidence: fusion.confidence,
        computed_at_ms: now_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Candle;
    use crate::domain::timeframe::PairTimeframe;

    fn analysis(tf: Timeframe, dir: TrendDirection, strength: f64) -> TimeframeAnalysis {
        TimeframeAnalysis {
            timeframe: tf,
            trend_direction: dir,
            signal_strength: strength,
        }
    }

    fn series(pair: &str, tf: Timeframe, closes: &[f64]) -> OhlcvTimeSeries {
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Candle::new(
                    i as i64 * tf.interval_ms(),
                    c,
                    c * 1.01,
                    c * 0.99,
                    c,
                    1000.0,
                )
            })
            .collect();
        OhlcvTimeSeries::from_candles(PairTimeframe::new(pair, tf), &candles)
    }

    /// A collection with enough uptrending candles on all three timeframes.
    fn trending_collection(pair: &str) -> TimeSeriesCollection {
        let mut collection = TimeSeriesCollection::default();
        let weekly: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 2.0).collect();
        let daily: Vec<f64> = (0..60).map(|i| 150.0 + i as f64 * 1.0).collect();
        let h4: Vec<f64> = (0..220).map(|i| 180.0 + i as f64 * 0.2).collect();
        collection.insert(series(pair, Timeframe::Weekly, &weekly));
        collection.insert(series(pair, Timeframe::Daily, &daily));
        collection.insert(series(pair, Timeframe::H4, &h4));
        collection
    }

    #[test]
    fn spec_scenario_unanimous_up_is_very_strong_buy() {
        // strengths 0.9 / 0.8 / 0.7 with weights 0.40 / 0.35 / 0.25
        let config = ConfluenceConfig::default();
        let weekly = analysis(Timeframe::Weekly, TrendDirection::Up, 0.9);
        let daily = analysis(Timeframe::Daily, TrendDirection::Up, 0.8);
        let h4 = analysis(Timeframe::H4, TrendDirection::Up, 0.7);

        let fusion = fuse(&config, [&weekly, &daily, &h4]);
        assert!((fusion.score - 0.915).abs() < 1e-12);
        assert_eq!(
            ConfluenceStrength::from_score(fusion.score),
            ConfluenceStrength::VeryStrong
        );
        assert_eq!(fusion.majority, Some(TrendDirection::Up));
    }

    #[test]
    fn unanimity_beats_any_disagreement_at_equal_strengths() {
        let config = ConfluenceConfig::default();
        let strength = 0.6;
        let unanimous = fuse(
            &config,
            [
                &analysis(Timeframe::Weekly, TrendDirection::Up, strength),
                &analysis(Timeframe::Daily, TrendDirection::Up, strength),
                &analysis(Timeframe::H4, TrendDirection::Up, strength),
            ],
        );

        // Every possible single-dissent and no-majority arrangement
        let dissents = [
            [TrendDirection::Down, TrendDirection::Up, TrendDirection::Up],
            [TrendDirection::Up, TrendDirection::Down, TrendDirection::Up],
            [TrendDirection::Up, TrendDirection::Up, TrendDirection::Down],
            [
                TrendDirection::Up,
                TrendDirection::Down,
                TrendDirection::Sideways,
            ],
            [
                TrendDirection::Sideways,
                TrendDirection::Sideways,
                TrendDirection::Sideways,
            ],
        ];
        for dirs in dissents {
            let fusion = fuse(
                &config,
                [
                    &analysis(Timeframe::Weekly, dirs[0], strength),
                    &analysis(Timeframe::Daily, dirs[1], strength),
                    &analysis(Timeframe::H4, dirs[2], strength),
                ],
            );
            assert!(
                unanimous.score >= fusion.score,
                "disagreement {:?} scored {} above unanimous {}",
                dirs,
                fusion.score,
                unanimous.score
            );
        }
    }

    #[test]
    fn no_majority_collapses_to_zero() {
        let config = ConfluenceConfig::default();
        let fusion = fuse(
            &config,
            [
                &analysis(Timeframe::Weekly, TrendDirection::Up, 0.95),
                &analysis(Timeframe::Daily, TrendDirection::Down, 0.95),
                &analysis(Timeframe::H4, TrendDirection::Sideways, 0.95),
            ],
        );
        assert_eq!(fusion.score, 0.0);
        assert_eq!(fusion.confidence, 0.0);
        assert_eq!(fusion.majority, None);
    }

    #[test]
    fn below_lookback_reports_not_ready() {
        let analyzer = ConfluenceAnalyzer::new(ConfluenceConfig::default());
        let mut collection = trending_collection("BTCUSDT");
        // Truncate weekly below its minimum
        let weekly: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        collection.series_data[0] = series("BTCUSDT", Timeframe::Weekly, &weekly);

        match analyzer.evaluate("BTCUSDT", &collection, 0) {
            ConfluenceOutcome::NotReady {
                timeframe, have, ..
            } => {
                assert_eq!(timeframe, Timeframe::Weekly);
                assert_eq!(have, 10);
            }
            other => panic!("expected NotReady, got {:?}", other),
        }
    }

    #[test]
    fn missing_series_reports_not_ready() {
        let analyzer = ConfluenceAnalyzer::new(ConfluenceConfig::default());
        let collection = TimeSeriesCollection::default();
        assert!(matches!(
            analyzer.evaluate("GHOSTUSDT", &collection, 0),
            ConfluenceOutcome::NotReady { .. }
        ));
    }

    #[test]
    fn trending_pair_produces_actionable_buy() {
        let analyzer = ConfluenceAnalyzer::new(ConfluenceConfig::default());
        let collection = trending_collection("BTCUSDT");
        match analyzer.evaluate("BTCUSDT", &collection, 42) {
            ConfluenceOutcome::Ready(result) => {
                assert_eq!(result.recommended_action, RecommendedAction::Buy);
                assert!(result.confluence_score > 0.3);
                assert!(result.stop_loss < result.entry);
                assert!(result.take_profit > result.entry);
                assert!(result.risk_reward_ratio >= 1.5);
                assert_eq!(result.computed_at_ms, 42);
            }
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn identical_candles_hit_the_cache() {
        let analyzer = ConfluenceAnalyzer::new(ConfluenceConfig::default());
        let collection = trending_collection("BTCUSDT");

        let first = match analyzer.evaluate("BTCUSDT", &collection, 1) {
            ConfluenceOutcome::Ready(r) => r,
            other => panic!("expected Ready, got {:?}", other),
        };
        // Second call with unchanged candles returns the same allocation
        let second = match analyzer.evaluate("BTCUSDT", &collection, 999) {
            ConfluenceOutcome::Ready(r) => r,
            other => panic!("expected Ready, got {:?}", other),
        };
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.confluence_score, second.confluence_score);
    }

    #[test]
    fn degenerate_atr_drops_the_signal() {
        let analyzer = ConfluenceAnalyzer::new(ConfluenceConfig::default());
        let mut collection = TimeSeriesCollection::default();
        // Perfectly flat candles: zero true range on H4
        let flat = |n: usize| -> Vec<Candle> {
            (0..n)
                .map(|i| Candle::new(i as i64, 100.0, 100.0, 100.0, 100.0, 10.0))
                .collect()
        };
        collection.insert(OhlcvTimeSeries::from_candles(
            PairTimeframe::new("FLATUSDT", Timeframe::Weekly),
            &flat(60),
        ));
        collection.insert(OhlcvTimeSeries::from_candles(
            PairTimeframe::new("FLATUSDT", Timeframe::Daily),
            &flat(60),
        ));
        collection.insert(OhlcvTimeSeries::from_candles(
            PairTimeframe::new("FLATUSDT", Timeframe::H4),
            &flat(220),
        ));

        assert!(matches!(
            analyzer.evaluate("FLATUSDT", &collection, 0),
            ConfluenceOutcome::Dropped { .. }
        ));
    }

    #[test]
    fn universe_sweep_covers_every_pair() {
        let analyzer = ConfluenceAnalyzer::new(ConfluenceConfig::default());
        let mut collection = trending_collection("BTCUSDT");
        for s in trending_collection("ETHUSDT").series_data {
            collection.insert(s);
        }
        let outcomes = analyzer.evaluate_universe(&collection, 0);
        assert_eq!(outcomes.len(), 2);
        assert!(
            outcomes
                .iter()
                .all(|(_, o)| matches!(o, ConfluenceOutcome::Ready(_)))
        );
    }
}
