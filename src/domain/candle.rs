use serde::{Deserialize, Serialize};

// Define the CandleType enum
#[derive(Debug, PartialEq)]
pub enum CandleType {
    Bullish,
    Bearish,
}

// An immutable OHLCV observation. Externally sourced, never mutated after
// ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time_ms: i64,

    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,

    pub base_volume: f64,
}

impl Candle {
    // A constructor for convenience
    pub fn new(
        open_time_ms: i64,
        open_price: f64,
        high_price: f64,
        low_price: f64,
        close_price: f64,
        base_volume: f64,
    ) -> Self {
        Candle {
            open_time_ms,
            open_price,
            high_price,
            low_price,
            close_price,
            base_volume,
        }
    }

    // A method to determine the type of candle
    pub fn get_type(&self) -> CandleType {
        if self.close_price >= self.open_price {
            CandleType::Bullish
        } else {
            CandleType::Bearish
        }
    }

    // Returns the low and high of the candle body as a tuple
    pub fn body_range(&self) -> (f64, f64) {
        match self.get_type() {
            CandleType::Bullish => (self.open_price, self.close_price),
            CandleType::Bearish => (self.close_price, self.open_price),
        }
    }

    /// True range relative to the previous close. With no previous close the
    /// plain high-low span is used (first candle of a series).
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let hl = self.high_price - self.low_price;
        match prev_close {
            Some(pc) => {
                let hc = (self.high_price - pc).abs();
                let lc = (self.low_price - pc).abs();
                hl.max(hc).max(lc)
            }
            None => hl,
        }
    }
}
