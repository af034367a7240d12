//! Technical Indicators Service
//!
//! Turns a stream of trades into OHLCV candles and streaming indicators:
//! - Tumbling-window candles, emitted on every trade, not only at window close
//! - Bounded per-series candle history with FIFO eviction
//! - SMA, EMA, RSI, MACD and OBV recomputed over that history
//! - Key-sharded workers with checkpointable state

pub mod aggregators;
pub mod codec;
pub mod config;
pub mod errors;
pub mod history;
pub mod indicators;
pub mod shard;
pub mod sink;
pub mod storage;
pub mod types;
pub mod window;

pub use aggregators::{Aggregator, AggregatorStats, CandleReducer, EmittedRecord};
pub use config::IndicatorConfig;
pub use errors::{CheckpointError, ConfigError, EventError};
pub use history::{KeyState, Upsert};
pub use indicators::{IndicatorEngine, IndicatorRecord, MacdParams, MacdValue};
pub use shard::{EngineStats, ShardedEngine};
pub use sink::{ChannelSink, JsonLinesSink, RecordSink};
pub use storage::{CheckpointStore, StateStore};
pub use types::{Candle, SeriesKey, Trade};
pub use window::{Window, WindowAssigner, assign};
