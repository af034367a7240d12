//! Aggregator implementations

pub mod candle;
pub mod coordinator;

pub use candle::CandleReducer;
pub use coordinator::{Aggregator, AggregatorStats, EmittedRecord};
