//! Per-series aggregation state machine
//!
//! Each trade either opens a new window (`init`) or folds into the active
//! one (`update`). The candle is upserted into the series history, the
//! indicator vector is recomputed, and one record is emitted per trade,
//! mid-window included. Consumers upsert records by
//! `(pair, window_start_ms, candle_seconds)`.

use super::candle::{self, CandleReducer};
use crate::config::IndicatorConfig;
use crate::errors::{CheckpointError, ConfigError, EventError};
use crate::history::{KeyState, Upsert};
use crate::indicators::{IndicatorEngine, IndicatorRecord};
use crate::types::{Candle, SeriesKey, Trade};
use crate::window::{Window, WindowAssigner};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::num::NonZeroUsize;
use tracing::{debug, trace};

/// Candle fields merged with the indicator vector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmittedRecord {
    /// Active candle after this event
    #[serde(flatten)]
    pub candle: Candle,
    /// Indicators over the history ending at this candle
    #[serde(flatten)]
    pub indicators: IndicatorRecord,
}

/// Event counters for one aggregator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregatorStats {
    /// Events accepted and emitted
    pub emitted: u64,
    /// Events older than the active window
    pub late_dropped: u64,
    /// Events with unusable fields
    pub malformed: u64,
    /// Candles for a different duration
    pub ignored: u64,
    /// Candles evicted from full histories
    pub evicted: u64,
}

impl AggregatorStats {
    /// Add another set of counters into this one
    pub fn merge(&mut self, other: &Self) {
        self.emitted += other.emitted;
        self.late_dropped += other.late_dropped;
        self.malformed += other.malformed;
        self.ignored += other.ignored;
        self.evicted += other.evicted;
    }
}

/// Owns every [`KeyState`] of one shard
#[derive(Debug, Clone)]
pub struct Aggregator {
    reducer: CandleReducer,
    engine: IndicatorEngine,
    capacity: NonZeroUsize,
    candle_seconds: u64,
    states: FxHashMap<SeriesKey, KeyState>,
    stats: AggregatorStats,
}

impl Aggregator {
    /// Build from a configuration, rejecting invalid settings
    pub fn new(config: &IndicatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let assigner = WindowAssigner::new(config.candle_seconds)?;
        Ok(Self {
            reducer: CandleReducer::new(assigner, config.candle_seconds),
            engine: config.indicator_engine(),
            capacity: config.capacity()?,
            candle_seconds: config.candle_seconds,
            states: FxHashMap::default(),
            stats: AggregatorStats::default(),
        })
    }

    /// Window duration served by this aggregator
    #[must_use]
    pub const fn candle_seconds(&self) -> u64 {
        self.candle_seconds
    }

    /// Key a trade is aggregated under
    #[must_use]
    pub fn key_for(&self, trade: &Trade) -> SeriesKey {
        SeriesKey::new(trade.pair.clone(), self.candle_seconds)
    }

    /// Fold a trade into its series and emit the updated record
    pub fn process_trade(&mut self, trade: &Trade) -> Result<EmittedRecord, EventError> {
        if let Err(err) = trade.validate() {
            self.stats.malformed += 1;
            return Err(err);
        }

        let window = match self.reducer.checked_window_at(trade.timestamp_ms) {
            Ok(window) => window,
            Err(err) => {
                self.stats.malformed += 1;
                return Err(err);
            }
        };
        let key = self.key_for(trade);

        let next = match self.states.get(&key).and_then(KeyState::current) {
            Some(tail) if window.start_ms < tail.window_start_ms => {
                self.stats.late_dropped += 1;
                return Err(EventError::LateEvent {
                    pair: trade.pair.clone(),
                    window_start_ms: window.start_ms,
                    tail_window_start_ms: tail.window_start_ms,
                });
            }
            Some(tail) if window.start_ms == tail.window_start_ms => {
                candle::update(tail.clone(), trade)
            }
            _ => {
                debug!(series = %key, window = %window, "opening window");
                candle::init(trade, window, self.candle_seconds)
            }
        };

        self.store_and_emit(key, next)
    }

    /// Upsert an already aggregated candle and emit the updated record.
    ///
    /// Returns `Ok(None)` for candles of another duration.
    pub fn process_candle(&mut self, candle: Candle) -> Result<Option<EmittedRecord>, EventError> {
        if candle.candle_seconds != self.candle_seconds {
            self.stats.ignored += 1;
            trace!(
                pair = %candle.pair,
                candle_seconds = candle.candle_seconds,
                "ignoring candle for another duration"
            );
            return Ok(None);
        }
        if let Err(err) = candle.validate() {
            self.stats.malformed += 1;
            return Err(err);
        }

        let aligned = self.reducer.checked_window_at(candle.window_start_ms).ok();
        let declared = Window {
            start_ms: candle.window_start_ms,
            end_ms: candle.window_end_ms,
        };
        if aligned != Some(declared) {
            self.stats.malformed += 1;
            return Err(EventError::InvalidField {
                field: "window_start_ms",
                reason: format!(
                    "[{}, {}) is not a {}s window",
                    candle.window_start_ms, candle.window_end_ms, self.candle_seconds
                ),
            });
        }

        let key = candle.series_key();
        if let Some(tail) = self.states.get(&key).and_then(KeyState::current) {
            if candle.window_start_ms < tail.window_start_ms {
                self.stats.late_dropped += 1;
                return Err(EventError::LateEvent {
                    pair: candle.pair.clone(),
                    window_start_ms: candle.window_start_ms,
                    tail_window_start_ms: tail.window_start_ms,
                });
            }
        }

        self.store_and_emit(key, candle).map(Some)
    }

    fn store_and_emit(&mut self, key: SeriesKey, candle: Candle) -> Result<EmittedRecord, EventError> {
        let capacity = self.capacity;
        let state = self
            .states
            .entry(key)
            .or_insert_with(|| KeyState::new(capacity));

        let active = candle.clone();
        match state.upsert(candle) {
            Upsert::AppendedWithEviction(evicted) => {
                self.stats.evicted += 1;
                trace!(pair = %evicted.pair, window_start_ms = evicted.window_start_ms, "evicted candle");
            }
            Upsert::Rejected => {
                self.stats.late_dropped += 1;
                return Err(EventError::LateEvent {
                    pair: active.pair,
                    window_start_ms: active.window_start_ms,
                    tail_window_start_ms: state.current().map_or(i64::MIN, |c| c.window_start_ms),
                });
            }
            Upsert::Appended | Upsert::Replaced => {}
        }

        let indicators = self.engine.compute(state.history());
        self.stats.emitted += 1;

        debug!(
            pair = %active.pair,
            window_start_ms = active.window_start_ms,
            close = active.close,
            volume = active.volume,
            history = state.len(),
            "emitting record"
        );

        Ok(EmittedRecord {
            candle: active,
            indicators,
        })
    }

    /// Active candle for a series
    #[must_use]
    pub fn current(&self, key: &SeriesKey) -> Option<&Candle> {
        self.states.get(key).and_then(KeyState::current)
    }

    /// Copy of one series state for checkpointing
    #[must_use]
    pub fn snapshot(&self, key: &SeriesKey) -> Option<KeyState> {
        self.states.get(key).cloned()
    }

    /// Copy of every series state, ordered by key
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<(SeriesKey, KeyState)> {
        let mut all: Vec<_> = self
            .states
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Install a previously snapshotted state, replacing any existing one.
    ///
    /// A state saved under a different capacity is resized to the current one.
    pub fn restore(&mut self, key: SeriesKey, mut state: KeyState) -> Result<(), CheckpointError> {
        if key.candle_seconds != self.candle_seconds {
            return Err(CheckpointError::InvalidState(format!(
                "{key} does not match configured {}s candles",
                self.candle_seconds
            )));
        }
        state.validate()?;
        if let Some(candle) = state.history().find(|c| c.series_key() != key) {
            return Err(CheckpointError::InvalidState(format!(
                "candle for {} stored under {key}",
                candle.series_key()
            )));
        }
        if state.capacity() != self.capacity.get() {
            debug!(series = %key, from = state.capacity(), to = self.capacity.get(), "resizing restored history");
            state.set_capacity(self.capacity);
        }
        self.states.insert(key, state);
        Ok(())
    }

    /// Number of tracked series
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.states.len()
    }

    /// Event counters so far
    #[must_use]
    pub const fn stats(&self) -> AggregatorStats {
        self.stats
    }
}
