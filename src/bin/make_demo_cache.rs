//! Generates a synthetic candle cache so the demo binary has something to
//! chew on without any exchange connectivity.

use anyhow::Result;
use strum::IntoEnumIterator;

use signal_warden::data::CandleCacheFile;
use signal_warden::domain::{Candle, PairTimeframe, Timeframe};
use signal_warden::models::timeseries::{OhlcvTimeSeries, TimeSeriesCollection};
use signal_warden::utils::time_utils::local_now_as_timestamp_ms;

const DEMO_PAIRS: &[(&str, f64, f64)] = &[
    // (pair, base price, per-candle drift)
    ("BTCUSDT", 60_000.0, 0.0015),
    ("ETHUSDT", 3_000.0, 0.0012),
    ("SOLUSDT", 150.0, -0.0010),
    ("PAXGUSDT", 2_400.0, 0.0002),
];

fn main() -> Result<()> {
    let mut collection = TimeSeriesCollection::default();
    let now_ms = local_now_as_timestamp_ms();

    for &(pair, base_price, drift) in DEMO_PAIRS {
        for timeframe in Timeframe::iter() {
            let count = timeframe.min_lookback() + 20;
            collection.insert(synthetic_series(
                pair, timeframe, base_price, drift, count, now_ms,
            ));
        }
    }

    let cache = CandleCacheFile::new(collection);
    let path = CandleCacheFile::default_cache_path();
    cache.save_to_path(&path)?;
    println!(
        "Demo cache written to {:?} with {} series.",
        path,
        cache.data.series_data.len()
    );
    Ok(())
}

/// Deterministic drift-plus-wobble walk. A tiny LCG supplies the wobble so
/// repeated runs produce identical caches.
fn synthetic_series(
    pair: &str,
    timeframe: Timeframe,
    base_price: f64,
    drift: f64,
    count: usize,
    now_ms: i64,
) -> OhlcvTimeSeries {
    let mut lcg: u64 = pair
        .bytes()
        .fold(0x9E37_79B9u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    let mut next_unit = move || {
        lcg = lcg.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((lcg >> 33) as f64 / (1u64 << 30) as f64) - 1.0 // [-1, 1)
    };

    let interval_ms = timeframe.interval_ms();
    let first_ts = now_ms - interval_ms * count as i64;
    let mut price = base_price;
    let mut candles = Vec::with_capacity(count);
    for i in 0..count {
        let wobble = next_unit() * 0.004;
        let open = price;
        let close = open * (1.0 + drift + wobble);
        let high = open.max(close) * (1.0 + 0.002 + next_unit().abs() * 0.002);
        let low = open.min(close) * (1.0 - 0.002 - next_unit().abs() * 0.002);
        let volume = 500.0 + next_unit().abs() * 2000.0;
        candles.push(Candle::new(
            first_ts + i as i64 * interval_ms,
            open,
            high,
            low,
            close,
            volume,
        ));
        price = close;
    }

    OhlcvTimeSeries::from_candles(PairTimeframe::new(pair, timeframe), &candles)
}
