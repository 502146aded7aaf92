use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::{CANDLE_CACHE_PATH, CANDLE_CACHE_VERSION, candle_cache_filename};
use crate::domain::candle::Candle;
use crate::domain::timeframe::Timeframe;
use crate::models::timeseries::TimeSeriesCollection;
use crate::utils::time_utils::how_many_seconds_ago;

use super::{DataError, MarketDataSource};

/// Serialized cache wrapper written by `make_demo_cache` and loaded at
/// startup. Uses bincode for ~10-20x faster serialization vs JSON.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CandleCacheFile {
    pub version: f64,
    pub timestamp_ms: i64,
    pub data: TimeSeriesCollection,
}

impl CandleCacheFile {
    pub fn new(data: TimeSeriesCollection) -> Self {
        Self {
            version: CANDLE_CACHE_VERSION,
            timestamp_ms: Utc::now().timestamp_millis(),
            data,
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).context(format!("Failed to open cache file: {:?}", path))?;
        let mut reader = BufReader::new(file);
        let cache: CandleCacheFile = bincode::deserialize_from(&mut reader)
            .context(format!("Failed to deserialize cache: {:?}", path))?;
        if cache.version != CANDLE_CACHE_VERSION {
            anyhow::bail!(
                "Cache version mismatch: file v{} vs required v{}",
                cache.version,
                CANDLE_CACHE_VERSION
            );
        }
        Ok(cache)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }
        let file =
            File::create(path).context(format!("Failed to create file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)
            .context(format!("Failed to serialize cache to: {}", path.display()))
    }

    pub fn default_cache_path() -> PathBuf {
        PathBuf::from(CANDLE_CACHE_PATH).join(candle_cache_filename())
    }

    pub fn age_seconds(&self) -> i64 {
        how_many_seconds_ago(self.timestamp_ms)
    }
}

/// A `MarketDataSource` backed by a loaded cache file. The whole collection
/// sits in memory; `get_candles` just slices the tail.
pub struct CandleCache {
    collection: TimeSeriesCollection,
}

impl CandleCache {
    pub fn from_collection(collection: TimeSeriesCollection) -> Self {
        Self { collection }
    }

    /// Load the cache off the blocking pool so an async caller is not
    /// stalled on disk I/O.
    pub async fn load_async(path: PathBuf) -> Result<Self> {
        let cache = tokio::task::spawn_blocking(move || CandleCacheFile::load_from_path(&path))
            .await
            .context("Cache load task panicked")?
            .context("Failed to load cache file")?;
        log::info!(
            "Cache loaded: {} series, {}s old",
            cache.data.series_data.len(),
            cache.age_seconds()
        );
        Ok(Self::from_collection(cache.data))
    }

    pub fn collection(&self) -> &TimeSeriesCollection {
        &self.collection
    }
}

#[async_trait]
impl MarketDataSource for CandleCache {
    fn signature(&self) -> &'static str {
        "Local Cache"
    }

    async fn get_candles(
        &self,
        pair: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, DataError> {
        let series = self
            .collection
            .get(pair, timeframe)
            .map_err(|e| DataError::unavailable(pair, timeframe, e.to_string()))?;
        Ok(series.tail_candles(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timeframe::PairTimeframe;
    use crate::models::timeseries::OhlcvTimeSeries;

    fn tiny_collection() -> TimeSeriesCollection {
        let candles: Vec<Candle> = (0..5)
            .map(|i| Candle::new(i, 1.0, 2.0, 0.5, 1.5, 100.0))
            .collect();
        let mut collection = TimeSeriesCollection::default();
        collection.insert(OhlcvTimeSeries::from_candles(
            PairTimeframe::new("BTCUSDT", Timeframe::H4),
            &candles,
        ));
        collection
    }

    #[tokio::test]
    async fn missing_pair_is_unavailable() {
        let source = CandleCache::from_collection(tiny_collection());
        let err = source
            .get_candles("NOPEUSDT", Timeframe::H4, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn returns_tail_of_series() {
        let source = CandleCache::from_collection(tiny_collection());
        let candles = source.get_candles("BTCUSDT", Timeframe::H4, 3).await.unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[0].open_time_ms, 2);
    }

    #[test]
    fn cache_file_roundtrip() {
        let dir = std::env::temp_dir().join("signal_warden_cache_test");
        let path = dir.join(candle_cache_filename());
        let cache = CandleCacheFile::new(tiny_collection());
        cache.save_to_path(&path).unwrap();
        let loaded = CandleCacheFile::load_from_path(&path).unwrap();
        assert_eq!(loaded.data.series_data.len(), 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
