//! Bounded per-series candle history
//!
//! Each [`KeyState`] holds the most recent candles of one series, oldest
//! first. Only the tail may be replaced in place; anything older is frozen.
//! When the buffer is full the oldest candle is evicted before a new window
//! is appended.

use crate::errors::CheckpointError;
use crate::types::Candle;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Result of an upsert into a [`KeyState`]
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    /// Tail candle was replaced (same window)
    Replaced,
    /// New window appended
    Appended,
    /// New window appended and the oldest candle dropped
    AppendedWithEviction(Candle),
    /// Candle is older than the tail and was not stored
    Rejected,
}

/// Owned history for one `(pair, candle_seconds)` series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyState {
    capacity: NonZeroUsize,
    candles: VecDeque<Candle>,
}

impl KeyState {
    /// Empty history holding at most `capacity` candles
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            candles: VecDeque::with_capacity(capacity.get().min(1024)),
        }
    }

    /// Maximum number of retained candles
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Number of retained candles
    #[must_use]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Whether no candle has been stored yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Active (most recent) candle
    #[must_use]
    pub fn current(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// Candles oldest to newest
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Candle> + DoubleEndedIterator {
        self.candles.iter()
    }

    /// Insert or replace the tail candle
    pub fn upsert(&mut self, candle: Candle) -> Upsert {
        let Some(tail) = self.candles.back_mut() else {
            self.candles.push_back(candle);
            return Upsert::Appended;
        };

        if candle.window_start_ms == tail.window_start_ms {
            *tail = candle;
            return Upsert::Replaced;
        }
        if candle.window_start_ms < tail.window_start_ms {
            return Upsert::Rejected;
        }

        self.candles.push_back(candle);
        if self.candles.len() > self.capacity.get() {
            if let Some(evicted) = self.candles.pop_front() {
                return Upsert::AppendedWithEviction(evicted);
            }
        }
        Upsert::Appended
    }

    /// Check the invariants of a state loaded from outside the process
    pub fn validate(&self) -> Result<(), CheckpointError> {
        if self.candles.len() > self.capacity.get() {
            return Err(CheckpointError::InvalidState(format!(
                "{} candles exceed capacity {}",
                self.candles.len(),
                self.capacity
            )));
        }
        let increasing = self
            .candles
            .iter()
            .zip(self.candles.iter().skip(1))
            .all(|(a, b)| a.window_start_ms < b.window_start_ms);
        if !increasing {
            return Err(CheckpointError::InvalidState(
                "window starts are not strictly increasing".to_string(),
            ));
        }
        Ok(())
    }

    /// Shrink or grow capacity, evicting the oldest candles if needed
    pub fn set_capacity(&mut self, capacity: NonZeroUsize) {
        self.capacity = capacity;
        while self.candles.len() > capacity.get() {
            self.candles.pop_front();
        }
    }
}
