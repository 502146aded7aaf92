//! The small indicator set the trend read is built from. All functions are
//! pure over their input slices; "not enough data" is always `None`, never an
//! error.

use crate::domain::candle::Candle;
use crate::utils::maths_utils;

/// Simple moving average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average over the whole slice, seeded with the SMA of
/// the first `period` values. Standard smoothing factor 2 / (period + 1).
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    let mut current = seed;
    for value in &values[period..] {
        current = alpha * value + (1.0 - alpha) * current;
    }
    Some(current)
}

/// Average true range over the last `period` candles (Wilder-style simple
/// mean of true ranges; each TR uses the prior candle's close).
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let start = candles.len() - period;
    let mut sum = 0.0;
    for idx in start..candles.len() {
        let prev_close = Some(candles[idx - 1].close_price);
        sum += candles[idx].true_range(prev_close);
    }
    Some(sum / period as f64)
}

/// Realized volatility: sample standard deviation of the last `window` log
/// returns computed from `closes`.
pub fn realized_volatility(closes: &[f64], window: usize) -> Option<f64> {
    let returns = maths_utils::log_returns(closes);
    if window < 2 || returns.len() < window {
        return None;
    }
    let tail = &returns[returns.len() - window..];
    Some(maths_utils::std_dev(tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_candles(n: usize, price: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64, price, price + 1.0, price - 1.0, price, 10.0))
            .collect()
    }

    #[test]
    fn sma_of_constant_series() {
        let values = vec![5.0; 20];
        assert_eq!(sma(&values, 10), Some(5.0));
        assert_eq!(sma(&values, 21), None);
    }

    #[test]
    fn ema_converges_toward_recent_values() {
        // Series that steps up: EMA must sit above the SMA of the whole run
        let mut values = vec![10.0; 30];
        values.extend(std::iter::repeat_n(20.0, 30));
        let e = ema(&values, 10).unwrap();
        assert!(e > 19.0, "EMA should track the recent level, got {}", e);
    }

    #[test]
    fn ema_on_constant_series_is_that_constant() {
        let values = vec![7.0; 50];
        let e = ema(&values, 10).unwrap();
        assert!((e - 7.0).abs() < 1e-12);
    }

    #[test]
    fn atr_of_flat_candles() {
        let candles = flat_candles(20, 100.0);
        // Every candle spans high-low = 2.0 and closes flat
        let a = atr(&candles, 14).unwrap();
        assert!((a - 2.0).abs() < 1e-12);
    }

    #[test]
    fn atr_needs_period_plus_one() {
        let candles = flat_candles(14, 100.0);
        assert!(atr(&candles, 14).is_none());
        assert!(atr(&flat_candles(15, 100.0), 14).is_some());
    }

    #[test]
    fn realized_vol_zero_for_constant_closes() {
        let closes = vec![50.0; 40];
        let vol = realized_volatility(&closes, 12).unwrap();
        assert_eq!(vol, 0.0);
    }
}
