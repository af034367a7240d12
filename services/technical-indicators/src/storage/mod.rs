//! Persistence for series state

pub mod checkpoint;

use crate::errors::CheckpointError;
use crate::history::KeyState;
use crate::types::SeriesKey;

pub use checkpoint::{CheckpointEntry, CheckpointHeader, CheckpointStore};

/// Durable home for snapshotted series state
pub trait StateStore: Send {
    /// Replace the stored state with `entries`
    fn save(&mut self, entries: &[(SeriesKey, KeyState)]) -> Result<(), CheckpointError>;

    /// Read back the last saved state; empty if nothing was saved
    fn load(&self) -> Result<Vec<(SeriesKey, KeyState)>, CheckpointError>;
}
