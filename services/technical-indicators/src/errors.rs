//! Error types for the indicator service
//!
//! Configuration errors are fatal at startup. Event errors are local to a
//! single trade or candle and never stop a shard.

use thiserror::Error;

/// Startup configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Candle duration must be strictly positive
    #[error("candle_seconds must be positive, got {0}")]
    NonPositiveDuration(u64),

    /// History capacity must be strictly positive
    #[error("max_candles_in_state must be positive, got {0}")]
    NonPositiveCapacity(usize),

    /// A period of zero was configured for an indicator
    #[error("invalid {indicator} period: {period}")]
    InvalidPeriod {
        /// Indicator family (sma, ema, rsi)
        indicator: &'static str,
        /// Offending period
        period: usize,
    },

    /// The same period appears twice in one list
    #[error("duplicate {indicator} period: {period}")]
    DuplicatePeriod {
        /// Indicator family (sma, ema, rsi)
        indicator: &'static str,
        /// Offending period
        period: usize,
    },

    /// MACD parameters must satisfy `0 < fast < slow` and `signal > 0`
    #[error("invalid MACD parameters: fast={fast} slow={slow} signal={signal}")]
    InvalidMacd {
        /// Fast EMA period
        fast: usize,
        /// Slow EMA period
        slow: usize,
        /// Signal EMA period
        signal: usize,
    },

    /// Shard count or channel capacity of zero
    #[error("invalid engine sizing: {0}")]
    EngineSizing(String),

    /// Configuration sources could not be read or deserialized
    #[error("failed to load configuration: {0}")]
    Load(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        Self::Load(err.to_string())
    }
}

/// Per-event errors. Never fatal; the offending event is dropped.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EventError {
    /// Payload could not be decoded
    #[error("malformed event: {0}")]
    Malformed(String),

    /// A field decoded but holds an unusable value
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Event belongs to a window older than the newest one held for its key
    #[error(
        "late event for {pair}: window {window_start_ms} is older than current window {tail_window_start_ms}"
    )]
    LateEvent {
        /// Instrument pair
        pair: String,
        /// Window the event maps to
        window_start_ms: i64,
        /// Window currently at the tail of the history
        tail_window_start_ms: i64,
    },
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Checkpoint file errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Underlying file I/O failed
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded or decoded
    #[error("checkpoint encoding error: {0}")]
    Encode(#[from] bincode::Error),

    /// File does not start with the checkpoint magic
    #[error("invalid checkpoint magic: {0:#x}")]
    BadMagic(u32),

    /// File was written by an incompatible format version
    #[error("unsupported checkpoint version: {0}")]
    UnsupportedVersion(u32),

    /// Decoded state violates history invariants
    #[error("invalid checkpoint state: {0}")]
    InvalidState(String),

    /// Stored CRC does not match the entry payload
    #[error("checkpoint entry {index} corrupted: expected crc {expected:#x}, got {actual:#x}")]
    Corrupted {
        /// Zero-based entry index
        index: u64,
        /// CRC stored in the frame
        expected: u32,
        /// CRC computed over the payload
        actual: u32,
    },
}
