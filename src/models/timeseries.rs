use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::domain::candle::Candle;
use crate::domain::timeframe::{PairTimeframe, Timeframe};

// ============================================================================
// OhlcvTimeSeries: Raw time series data for one pair at one timeframe
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OhlcvTimeSeries {
    pub pair_timeframe: PairTimeframe,
    pub first_kline_timestamp_ms: i64,

    // Prices
    pub open_prices: Vec<f64>,
    pub high_prices: Vec<f64>,
    pub low_prices: Vec<f64>,
    pub close_prices: Vec<f64>,

    // Volumes
    pub base_asset_volumes: Vec<f64>,
}

impl OhlcvTimeSeries {
    pub fn new(pair_timeframe: PairTimeframe, first_kline_timestamp_ms: i64) -> Self {
        Self {
            pair_timeframe,
            first_kline_timestamp_ms,
            open_prices: Vec::new(),
            high_prices: Vec::new(),
            low_prices: Vec::new(),
            close_prices: Vec::new(),
            base_asset_volumes: Vec::new(),
        }
    }

    pub fn from_candles(pair_timeframe: PairTimeframe, candles: &[Candle]) -> Self {
        let first_ts = candles.first().map(|c| c.open_time_ms).unwrap_or(0);
        let mut series = Self::new(pair_timeframe, first_ts);
        for c in candles {
            series.push_candle(c);
        }
        series
    }

    pub fn push_candle(&mut self, candle: &Candle) {
        self.open_prices.push(candle.open_price);
        self.high_prices.push(candle.high_price);
        self.low_prices.push(candle.low_price);
        self.close_prices.push(candle.close_price);
        self.base_asset_volumes.push(candle.base_volume);
    }

    pub fn get_candle(&self, idx: usize) -> Candle {
        Candle::new(
            self.first_kline_timestamp_ms
                + idx as i64 * self.pair_timeframe.timeframe.interval_ms(),
            self.open_prices[idx],
            self.high_prices[idx],
            self.low_prices[idx],
            self.close_prices[idx],
            self.base_asset_volumes[idx],
        )
    }

    pub fn klines(&self) -> usize {
        self.open_prices.len()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.close_prices.last().copied()
    }

    pub fn last_kline_timestamp_ms(&self) -> i64 {
        if self.open_prices.is_empty() {
            return self.first_kline_timestamp_ms;
        }
        self.first_kline_timestamp_ms
            + ((self.open_prices.len() - 1) as i64)
                * self.pair_timeframe.timeframe.interval_ms()
    }

    /// The most recent `count` candles (all of them if fewer exist).
    pub fn tail_candles(&self, count: usize) -> Vec<Candle> {
        let total = self.klines();
        let start = total.saturating_sub(count);
        (start..total).map(|i| self.get_candle(i)).collect()
    }
}

pub fn find_matching_ohlcv<'a>(
    timeseries_data: &'a [OhlcvTimeSeries],
    pair_name: &str,
    timeframe: Timeframe,
) -> Result<&'a OhlcvTimeSeries> {
    timeseries_data
        .iter()
        .find(|ohlcv| {
            ohlcv.pair_timeframe.pair == pair_name && ohlcv.pair_timeframe.timeframe == timeframe
        })
        .ok_or_else(|| {
            anyhow!(
                "No matching OHLCV data found for pair {} at {}",
                pair_name,
                timeframe.label()
            )
        })
}

// ============================================================================
// TimeSeriesCollection: everything the engine knows about, all timeframes
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TimeSeriesCollection {
    pub series_data: Vec<OhlcvTimeSeries>,
}

impl TimeSeriesCollection {
    pub fn unique_pair_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .series_data
            .iter()
            .map(|s| s.pair_timeframe.pair.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn get(&self, pair_name: &str, timeframe: Timeframe) -> Result<&OhlcvTimeSeries> {
        find_matching_ohlcv(&self.series_data, pair_name, timeframe)
    }

    pub fn insert(&mut self, series: OhlcvTimeSeries) {
        self.series_data.push(series);
    }
}
