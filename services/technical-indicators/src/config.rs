//! Indicator service configuration
//!
//! Static for the lifetime of the process. Sources, lowest priority first:
//! built-in defaults, optional TOML file, `INDICATORS_*` environment
//! variables. The binary applies CLI overrides on top.

use crate::errors::ConfigError;
use crate::indicators::{IndicatorEngine, MacdParams};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::warn;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "INDICATORS";

/// Indicator service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Candle (tumbling window) duration in seconds
    pub candle_seconds: u64,

    /// Maximum candles retained per series
    pub max_candles_in_state: usize,

    /// SMA periods
    pub sma_periods: Vec<usize>,

    /// EMA periods
    pub ema_periods: Vec<usize>,

    /// RSI periods
    pub rsi_periods: Vec<usize>,

    /// MACD fast EMA period
    pub macd_fast: usize,

    /// MACD slow EMA period
    pub macd_slow: usize,

    /// MACD signal EMA period
    pub macd_signal: usize,

    /// Number of worker shards
    pub shards: usize,

    /// Bounded queue depth per shard
    pub channel_capacity: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            candle_seconds: 60,
            max_candles_in_state: 100,
            sma_periods: vec![7, 14, 21, 60],
            ema_periods: vec![7, 14, 21, 60],
            rsi_periods: vec![7, 14, 21, 60],
            macd_fast: 7,
            macd_slow: 14,
            macd_signal: 9,
            shards: 4,
            channel_capacity: 10_000,
        }
    }
}

impl IndicatorConfig {
    /// Load from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("sma_periods")
                    .with_list_parse_key("ema_periods")
                    .with_list_parse_key("rsi_periods"),
            )
            .build()?;

        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject configurations that cannot run
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.candle_seconds == 0 {
            return Err(ConfigError::NonPositiveDuration(self.candle_seconds));
        }
        if self.max_candles_in_state == 0 {
            return Err(ConfigError::NonPositiveCapacity(self.max_candles_in_state));
        }

        check_periods("sma", &self.sma_periods)?;
        check_periods("ema", &self.ema_periods)?;
        check_periods("rsi", &self.rsi_periods)?;

        if self.macd_fast == 0 || self.macd_signal == 0 || self.macd_fast >= self.macd_slow {
            return Err(ConfigError::InvalidMacd {
                fast: self.macd_fast,
                slow: self.macd_slow,
                signal: self.macd_signal,
            });
        }

        if self.shards == 0 {
            return Err(ConfigError::EngineSizing("shards must be positive".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::EngineSizing(
                "channel_capacity must be positive".to_string(),
            ));
        }

        let warmup = self.indicator_engine().warmup_candles();
        if warmup > self.max_candles_in_state {
            warn!(
                warmup,
                capacity = self.max_candles_in_state,
                "history capacity is below the longest warm-up; some indicators will stay undefined"
            );
        }
        Ok(())
    }

    /// History capacity as a non-zero count
    pub fn capacity(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.max_candles_in_state)
            .ok_or(ConfigError::NonPositiveCapacity(self.max_candles_in_state))
    }

    /// MACD parameters
    #[must_use]
    pub const fn macd(&self) -> MacdParams {
        MacdParams {
            fast: self.macd_fast,
            slow: self.macd_slow,
            signal: self.macd_signal,
        }
    }

    /// Indicator engine for these periods
    #[must_use]
    pub fn indicator_engine(&self) -> IndicatorEngine {
        IndicatorEngine::new(
            self.sma_periods.clone(),
            self.ema_periods.clone(),
            self.rsi_periods.clone(),
            self.macd(),
        )
    }
}

fn check_periods(indicator: &'static str, periods: &[usize]) -> Result<(), ConfigError> {
    let mut seen = FxHashSet::default();
    for &period in periods {
        if period == 0 {
            return Err(ConfigError::InvalidPeriod { indicator, period });
        }
        if !seen.insert(period) {
            return Err(ConfigError::DuplicatePeriod { indicator, period });
        }
    }
    Ok(())
}
