//! Core data model: trades, candles and the per-series key

use crate::errors::EventError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single executed trade as delivered by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Instrument pair, e.g. `BTC/USD`
    pub pair: String,
    /// Execution price
    pub price: f64,
    /// Executed quantity
    pub quantity: f64,
    /// Exchange timestamp in milliseconds since epoch
    pub timestamp_ms: i64,
}

impl Trade {
    /// Create a new trade
    pub fn new(pair: impl Into<String>, price: f64, quantity: f64, timestamp_ms: i64) -> Self {
        Self {
            pair: pair.into(),
            price,
            quantity,
            timestamp_ms,
        }
    }

    /// Reject trades whose fields cannot be reduced into a candle
    pub fn validate(&self) -> Result<(), EventError> {
        if self.pair.trim().is_empty() {
            return Err(EventError::InvalidField {
                field: "pair",
                reason: "empty".to_string(),
            });
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(EventError::InvalidField {
                field: "price",
                reason: format!("must be finite and positive, got {}", self.price),
            });
        }
        if !self.quantity.is_finite() || self.quantity < 0.0 {
            return Err(EventError::InvalidField {
                field: "quantity",
                reason: format!("must be finite and non-negative, got {}", self.quantity),
            });
        }
        Ok(())
    }
}

/// OHLCV candle for one tumbling window of one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Instrument pair
    pub pair: String,
    /// Inclusive window start (ms)
    pub window_start_ms: i64,
    /// Exclusive window end (ms)
    pub window_end_ms: i64,
    /// Window duration in seconds
    pub candle_seconds: u64,
    /// First trade price
    pub open: f64,
    /// Highest trade price
    pub high: f64,
    /// Lowest trade price
    pub low: f64,
    /// Most recent trade price
    pub close: f64,
    /// Summed quantity
    pub volume: f64,
}

impl Candle {
    /// Key of the series this candle belongs to
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::new(self.pair.clone(), self.candle_seconds)
    }

    /// Reject upstream candles that break OHLC or window invariants
    pub fn validate(&self) -> Result<(), EventError> {
        if self.pair.trim().is_empty() {
            return Err(EventError::InvalidField {
                field: "pair",
                reason: "empty".to_string(),
            });
        }
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(EventError::InvalidField {
                field: "ohlc",
                reason: "prices must be finite and positive".to_string(),
            });
        }
        if self.low > self.high || self.open > self.high || self.open < self.low
            || self.close > self.high || self.close < self.low
        {
            return Err(EventError::InvalidField {
                field: "ohlc",
                reason: format!(
                    "inconsistent range o={} h={} l={} c={}",
                    self.open, self.high, self.low, self.close
                ),
            });
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(EventError::InvalidField {
                field: "volume",
                reason: format!("must be finite and non-negative, got {}", self.volume),
            });
        }
        Ok(())
    }
}

/// Identity of one candle series: `(pair, candle_seconds)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    /// Instrument pair
    pub pair: String,
    /// Window duration in seconds
    pub candle_seconds: u64,
}

impl SeriesKey {
    /// Create a new series key
    pub fn new(pair: impl Into<String>, candle_seconds: u64) -> Self {
        Self {
            pair: pair.into(),
            candle_seconds,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}s", self.pair, self.candle_seconds)
    }
}
