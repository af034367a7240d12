//! Streaming technical indicators over a bounded candle history
//!
//! Every indicator is recomputed from the full retained history on each
//! call. Values that have not warmed up yet are `None`, never zero.
//!
//! Indicators implemented:
//! - SMA(p): mean of the last `p` closes
//! - EMA(p): `alpha = 2 / (p + 1)`, seeded with the SMA of the first `p` closes
//! - RSI(p): Wilder's smoothing (`alpha = 1 / p`) of gains and losses
//! - MACD(fast, slow, signal): `EMA(fast) - EMA(slow)`, signal EMA of that line
//! - OBV: running volume signed by close-to-close direction
//!
//! OBV only sees retained candles, so once the history starts evicting it
//! is a windowed approximation rather than an all-time total.

use crate::types::Candle;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// MACD periods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacdParams {
    /// Fast EMA period
    pub fast: usize,
    /// Slow EMA period
    pub slow: usize,
    /// Signal EMA period
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 7,
            slow: 14,
            signal: 9,
        }
    }
}

/// MACD output for the newest candle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdValue {
    /// `EMA(fast) - EMA(slow)`
    pub macd: Option<f64>,
    /// EMA of the MACD line
    pub signal: Option<f64>,
    /// `macd - signal`
    pub hist: Option<f64>,
}

/// Simple moving average of the last `period` values
#[must_use]
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Full EMA series. Element `i` corresponds to input index `i + period - 1`.
#[must_use]
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &v in &values[period..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Exponential moving average at the newest value
#[must_use]
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).last().copied()
}

/// Wilder's RSI at the newest value; needs `period + 1` closes.
///
/// A flat series has neither gains nor losses; it reports the neutral 50.
/// TA-Lib's streaming RSI reports 0.0 in that case, so records for a flat
/// series differ from TA-Lib output there.
#[must_use]
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let p = period as f64;
    let mut changes = closes.windows(2).map(|w| w[1] - w[0]);

    let (mut avg_gain, mut avg_loss) = changes
        .by_ref()
        .take(period)
        .fold((0.0, 0.0), |(g, l), d| {
            if d > 0.0 { (g + d, l) } else { (g, l - d) }
        });
    avg_gain /= p;
    avg_loss /= p;

    for d in changes {
        let (gain, loss) = if d > 0.0 { (d, 0.0) } else { (0.0, -d) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
    }

    let total = avg_gain + avg_loss;
    if total == 0.0 {
        return Some(50.0);
    }
    // Equivalent to 100 - 100 / (1 + RS) without dividing by a zero loss
    Some(100.0 * avg_gain / total)
}

/// MACD line, signal line and histogram at the newest value
#[must_use]
pub fn macd(closes: &[f64], params: MacdParams) -> MacdValue {
    let MacdParams { fast, slow, signal } = params;
    let fast_series = ema_series(closes, fast);
    let slow_series = ema_series(closes, slow);

    if slow_series.is_empty() || fast_series.is_empty() || fast > slow {
        return MacdValue {
            macd: None,
            signal: None,
            hist: None,
        };
    }

    // Align the fast series to the first index where the slow one exists
    let offset = slow - fast;
    let line: Vec<f64> = slow_series
        .iter()
        .zip(&fast_series[offset..])
        .map(|(s, f)| f - s)
        .collect();

    let macd_now = line.last().copied();
    let signal_now = ema(&line, signal);
    let hist_now = match (macd_now, signal_now) {
        (Some(m), Some(s)) => Some(m - s),
        _ => None,
    };

    MacdValue {
        macd: macd_now,
        signal: signal_now,
        hist: hist_now,
    }
}

/// On-balance volume over the given candles, starting from the first volume
#[must_use]
pub fn obv(closes: &[f64], volumes: &[f64]) -> Option<f64> {
    let first = *volumes.first()?;
    let total = closes
        .windows(2)
        .zip(volumes.iter().skip(1))
        .fold(first, |acc, (w, v)| {
            if w[1] > w[0] {
                acc + v
            } else if w[1] < w[0] {
                acc - v
            } else {
                acc
            }
        });
    Some(total)
}

/// Indicator vector for the newest candle of a series
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    /// `(period, value)` per configured SMA period
    pub sma: Vec<(usize, Option<f64>)>,
    /// `(period, value)` per configured EMA period
    pub ema: Vec<(usize, Option<f64>)>,
    /// `(period, value)` per configured RSI period
    pub rsi: Vec<(usize, Option<f64>)>,
    /// Fast period used to name the MACD fields
    pub macd_fast: usize,
    /// MACD output
    pub macd: MacdValue,
    /// On-balance volume
    pub obv: Option<f64>,
}

fn lookup(values: &[(usize, Option<f64>)], period: usize) -> Option<f64> {
    values
        .iter()
        .find(|(p, _)| *p == period)
        .and_then(|(_, v)| *v)
}

impl IndicatorRecord {
    /// SMA for `period`, `None` if not configured or not warmed up
    #[must_use]
    pub fn sma(&self, period: usize) -> Option<f64> {
        lookup(&self.sma, period)
    }

    /// EMA for `period`, `None` if not configured or not warmed up
    #[must_use]
    pub fn ema(&self, period: usize) -> Option<f64> {
        lookup(&self.ema, period)
    }

    /// RSI for `period`, `None` if not configured or not warmed up
    #[must_use]
    pub fn rsi(&self, period: usize) -> Option<f64> {
        lookup(&self.rsi, period)
    }
}

impl Serialize for IndicatorRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.sma.len() + self.ema.len() + self.rsi.len() + 4;
        let mut map = serializer.serialize_map(Some(len))?;
        for (prefix, values) in [("sma", &self.sma), ("ema", &self.ema), ("rsi", &self.rsi)] {
            for (period, value) in values {
                map.serialize_entry(&format!("{prefix}_{period}"), value)?;
            }
        }
        map.serialize_entry(&format!("macd_{}", self.macd_fast), &self.macd.macd)?;
        map.serialize_entry(&format!("macdsignal_{}", self.macd_fast), &self.macd.signal)?;
        map.serialize_entry(&format!("macdhist_{}", self.macd_fast), &self.macd.hist)?;
        map.serialize_entry("obv", &self.obv)?;
        map.end()
    }
}

/// Computes the configured indicator vector from a candle history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorEngine {
    sma_periods: Vec<usize>,
    ema_periods: Vec<usize>,
    rsi_periods: Vec<usize>,
    macd: MacdParams,
}

impl IndicatorEngine {
    /// Create an engine; periods are expected to be validated already
    #[must_use]
    pub const fn new(
        sma_periods: Vec<usize>,
        ema_periods: Vec<usize>,
        rsi_periods: Vec<usize>,
        macd: MacdParams,
    ) -> Self {
        Self {
            sma_periods,
            ema_periods,
            rsi_periods,
            macd,
        }
    }

    /// Fewest candles needed before every configured indicator is defined
    #[must_use]
    pub fn warmup_candles(&self) -> usize {
        let sma = self.sma_periods.iter().copied().max().unwrap_or(0);
        let ema = self.ema_periods.iter().copied().max().unwrap_or(0);
        let rsi = self.rsi_periods.iter().map(|p| p + 1).max().unwrap_or(0);
        let macd = self.macd.slow + self.macd.signal - 1;
        sma.max(ema).max(rsi).max(macd)
    }

    /// Compute indicators over `history`, oldest first, tail included
    pub fn compute<'a, I>(&self, history: I) -> IndicatorRecord
    where
        I: IntoIterator<Item = &'a Candle>,
    {
        let (closes, volumes): (Vec<f64>, Vec<f64>) =
            history.into_iter().map(|c| (c.close, c.volume)).unzip();

        IndicatorRecord {
            sma: self.sma_periods.iter().map(|&p| (p, sma(&closes, p))).collect(),
            ema: self.ema_periods.iter().map(|&p| (p, ema(&closes, p))).collect(),
            rsi: self.rsi_periods.iter().map(|&p| (p, rsi(&closes, p))).collect(),
            macd_fast: self.macd.fast,
            macd: macd(&closes, self.macd),
            obv: obv(&closes, &volumes),
        }
    }
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new(
            vec![7, 14, 21, 60],
            vec![7, 14, 21, 60],
            vec![7, 14, 21, 60],
            MacdParams::default(),
        )
    }
}
