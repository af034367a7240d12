//! OHLCV candle reduction

use crate::errors::EventError;
use crate::types::{Candle, Trade};
use crate::window::{Window, WindowAssigner};

/// Reducer that opens and updates candles for a fixed window duration
#[derive(Debug, Clone, Copy)]
pub struct CandleReducer {
    assigner: WindowAssigner,
    candle_seconds: u64,
}

impl CandleReducer {
    /// Create a reducer for windows of `candle_seconds`
    #[must_use]
    pub const fn new(assigner: WindowAssigner, candle_seconds: u64) -> Self {
        Self {
            assigner,
            candle_seconds,
        }
    }

    /// Window the trade belongs to
    #[must_use]
    pub fn window_for(&self, trade: &Trade) -> Window {
        self.assigner.assign(trade.timestamp_ms)
    }

    /// Window containing `timestamp_ms`, rejecting timestamps whose window
    /// does not fit in the `i64` millisecond range
    pub fn checked_window_at(&self, timestamp_ms: i64) -> Result<Window, EventError> {
        self.assigner
            .checked_assign(timestamp_ms)
            .ok_or_else(|| EventError::InvalidField {
                field: "timestamp_ms",
                reason: format!("{timestamp_ms} has no representable window"),
            })
    }

    /// Open a new candle from the first trade of a window
    #[must_use]
    pub fn init(&self, trade: &Trade) -> Candle {
        init(trade, self.window_for(trade), self.candle_seconds)
    }
}

/// Open a candle: every price field takes the trade price
#[must_use]
pub fn init(trade: &Trade, window: Window, candle_seconds: u64) -> Candle {
    Candle {
        pair: trade.pair.clone(),
        window_start_ms: window.start_ms,
        window_end_ms: window.end_ms,
        candle_seconds,
        open: trade.price,
        high: trade.price,
        low: trade.price,
        close: trade.price,
        volume: trade.quantity,
    }
}

/// Fold a trade into an open candle. `open` is never touched.
#[must_use]
pub fn update(mut candle: Candle, trade: &Trade) -> Candle {
    if trade.price > candle.high {
        candle.high = trade.price;
    }
    if trade.price < candle.low {
        candle.low = trade.price;
    }
    candle.close = trade.price;
    candle.volume += trade.quantity;
    candle
}
