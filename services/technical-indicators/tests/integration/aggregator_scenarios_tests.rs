//! End-to-end scenarios through the aggregation coordinator

use anyhow::Result;
use pretty_assertions::assert_eq;
use rstest::*;
use technical_indicators::{
    Aggregator, Candle, CheckpointStore, EventError, IndicatorConfig, SeriesKey, StateStore, Trade,
};
use tempfile::TempDir;
use test_utils::{
    CandleFactory, TradeFactory, assert_err_matches, assert_indicator, assert_ohlcv,
    default_config, init_test_logging, minute_trades, small_aggregator, small_config,
    worked_example_trades,
};

#[rstest]
fn test_worked_example_emissions(
    mut small_aggregator: Aggregator,
    worked_example_trades: Vec<Trade>,
) -> Result<()> {
    init_test_logging();
    let records = worked_example_trades
        .iter()
        .map(|t| small_aggregator.process_trade(t))
        .collect::<Result<Vec<_>, _>>()?;

    assert_ohlcv(&records[0], (100.0, 100.0, 100.0, 100.0, 1.0));
    assert_ohlcv(&records[1], (100.0, 110.0, 100.0, 110.0, 3.0));
    assert_ohlcv(&records[2], (90.0, 90.0, 90.0, 90.0, 1.0));
    assert_eq!(records[1].candle.window_start_ms, records[0].candle.window_start_ms);
    assert_eq!(
        (records[2].candle.window_start_ms, records[2].candle.window_end_ms),
        (60_000, 120_000)
    );

    // The first window is frozen in history behind the new tail
    let state = small_aggregator
        .snapshot(&SeriesKey::new("BTC/USD", 60))
        .expect("series exists");
    let closes: Vec<f64> = state.history().map(|c| c.close).collect();
    assert_eq!(closes, vec![110.0, 90.0]);
    assert_eq!(small_aggregator.stats().emitted, 3);
    Ok(())
}

#[rstest]
fn test_late_trade_dropped_without_mutation(mut small_aggregator: Aggregator) -> Result<()> {
    small_aggregator.process_trade(&Trade::new("BTC/USD", 100.0, 1.0, 0))?;
    small_aggregator.process_trade(&Trade::new("BTC/USD", 101.0, 1.0, 60_000))?;
    let key = SeriesKey::new("BTC/USD", 60);
    let before = small_aggregator.snapshot(&key);

    let late = small_aggregator.process_trade(&Trade::new("BTC/USD", 50.0, 9.0, 59_999));

    assert_err_matches!(
        late,
        EventError::LateEvent {
            window_start_ms: 0,
            tail_window_start_ms: 60_000,
            ..
        }
    );
    assert_eq!(small_aggregator.snapshot(&key), before);
    assert_eq!(small_aggregator.stats().late_dropped, 1);
    Ok(())
}

#[rstest]
fn test_out_of_order_within_active_window_is_accepted(
    mut small_aggregator: Aggregator,
) -> Result<()> {
    small_aggregator.process_trade(&Trade::new("BTC/USD", 100.0, 1.0, 50_000))?;
    let record = small_aggregator.process_trade(&Trade::new("BTC/USD", 95.0, 1.0, 10_000))?;

    // Close follows processing order, not timestamp order
    assert_ohlcv(&record, (100.0, 100.0, 95.0, 95.0, 2.0));
    Ok(())
}

#[rstest]
fn test_history_is_bounded_over_long_run(small_config: IndicatorConfig) -> Result<()> {
    let mut aggregator = Aggregator::new(&small_config)?;
    let trades = TradeFactory::new("BTC/USD")
        .every(60_000)
        .random_walk(25, 100.0, 0.02, 42);

    for trade in &trades {
        aggregator.process_trade(trade)?;
    }

    let state = aggregator
        .snapshot(&SeriesKey::new("BTC/USD", 60))
        .expect("series exists");
    assert_eq!(state.len(), small_config.max_candles_in_state);
    assert_eq!(aggregator.stats().evicted, 15);
    assert_eq!(
        state.history().next().map(|c| c.window_start_ms),
        Some(15 * 60_000)
    );
    Ok(())
}

#[rstest]
fn test_pairs_are_independent(mut small_aggregator: Aggregator) -> Result<()> {
    small_aggregator.process_trade(&Trade::new("BTC/USD", 100.0, 1.0, 120_000))?;
    // ETH is behind BTC in time; it must not be treated as late
    let eth = small_aggregator.process_trade(&Trade::new("ETH/USD", 10.0, 4.0, 0))?;

    assert_ohlcv(&eth, (10.0, 10.0, 10.0, 10.0, 4.0));
    assert_eq!(small_aggregator.series_count(), 2);
    Ok(())
}

#[rstest]
fn test_record_indicators_match_history(small_config: IndicatorConfig) -> Result<()> {
    let mut aggregator = Aggregator::new(&small_config)?;
    let engine = small_config.indicator_engine();
    let trades = TradeFactory::new("BTC/USD")
        .every(15_000)
        .random_walk(80, 250.0, 0.01, 7);

    let mut last = None;
    for trade in &trades {
        last = Some(aggregator.process_trade(trade)?);
    }

    let state = aggregator
        .snapshot(&SeriesKey::new("BTC/USD", 60))
        .expect("series exists");
    let last = last.expect("at least one record");
    assert_eq!(last.indicators, engine.compute(state.history()));
    assert!(last.indicators.macd.hist.is_some());
    Ok(())
}

#[rstest]
fn test_upstream_candles_feed_the_same_history(mut small_aggregator: Aggregator) -> Result<()> {
    let factory = CandleFactory::new("BTC/USD", 60);
    for candle in factory.series(&[10.0, 11.0, 12.0]) {
        assert!(small_aggregator.process_candle(candle)?.is_some());
    }

    // A trade in the tail window updates the upstream candle in place
    let record = small_aggregator.process_trade(&Trade::new("BTC/USD", 13.0, 1.0, 150_000))?;
    assert_ohlcv(&record, (12.0, 13.0, 12.0, 13.0, 2.0));
    assert_indicator(record.indicators.sma(3), 34.0 / 3.0, 1e-9);
    Ok(())
}

#[rstest]
fn test_candle_for_other_duration_is_ignored(mut small_aggregator: Aggregator) -> Result<()> {
    let five_minute = CandleFactory::new("BTC/USD", 300).candle(0, 10.0, 1.0);

    assert_eq!(small_aggregator.process_candle(five_minute)?, None);
    assert_eq!(small_aggregator.series_count(), 0);
    assert_eq!(small_aggregator.stats().ignored, 1);
    Ok(())
}

#[rstest]
fn test_misaligned_candle_rejected(mut small_aggregator: Aggregator) {
    let candle = Candle {
        window_start_ms: 30_000,
        window_end_ms: 90_000,
        ..CandleFactory::new("BTC/USD", 60).candle(0, 10.0, 1.0)
    };

    assert_err_matches!(
        small_aggregator.process_candle(candle),
        EventError::InvalidField {
            field: "window_start_ms",
            ..
        }
    );
    assert_eq!(small_aggregator.stats().malformed, 1);
}

#[rstest]
fn test_invalid_trade_creates_no_state(mut small_aggregator: Aggregator) {
    assert_err_matches!(
        small_aggregator.process_trade(&Trade::new("BTC/USD", f64::NAN, 1.0, 0)),
        EventError::InvalidField { field: "price", .. }
    );
    assert_eq!(small_aggregator.series_count(), 0);
    assert_eq!(small_aggregator.stats().malformed, 1);
}

#[rstest]
fn test_checkpoint_restore_resumes_identically(small_config: IndicatorConfig) -> Result<()> {
    let dir = TempDir::new()?;
    let trades = TradeFactory::new("BTC/USD")
        .every(20_000)
        .random_walk(60, 100.0, 0.01, 3);
    let (history, next) = trades.split_at(trades.len() - 1);

    let mut original = Aggregator::new(&small_config)?;
    for trade in history {
        original.process_trade(trade)?;
    }

    let mut store = CheckpointStore::new(dir.path().join("indicators.ckpt"));
    store.save(&original.snapshot_all())?;

    let mut restored = Aggregator::new(&small_config)?;
    for (key, state) in store.load()? {
        restored.restore(key, state)?;
    }
    assert_eq!(restored.snapshot_all(), original.snapshot_all());

    let expected = original.process_trade(&next[0])?;
    let actual = restored.process_trade(&next[0])?;
    assert_eq!(actual, expected);
    Ok(())
}

#[rstest]
fn test_restore_into_smaller_capacity(small_config: IndicatorConfig) -> Result<()> {
    let mut large = Aggregator::new(&small_config)?;
    for trade in TradeFactory::new("BTC/USD")
        .every(60_000)
        .from_prices(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
    {
        large.process_trade(&trade)?;
    }

    let smaller = IndicatorConfig {
        max_candles_in_state: 4,
        ..small_config
    };
    let mut small = Aggregator::new(&smaller)?;
    for (key, state) in large.snapshot_all() {
        small.restore(key, state)?;
    }

    let state = small
        .snapshot(&SeriesKey::new("BTC/USD", 60))
        .expect("series restored");
    assert_eq!(state.capacity(), 4);
    let closes: Vec<f64> = state.history().map(|c| c.close).collect();
    assert_eq!(closes, vec![3.0, 4.0, 5.0, 6.0]);
    Ok(())
}

#[rstest]
fn test_default_periods_warm_up_at_sixty_candles(
    default_config: IndicatorConfig,
    minute_trades: TradeFactory,
) -> Result<()> {
    let mut aggregator = Aggregator::new(&default_config)?;
    let prices: Vec<f64> = (1..=61).map(f64::from).collect();
    let trades = minute_trades
        .starting_at(1_700_000_040_000)
        .from_prices(&prices);

    let records = trades
        .iter()
        .map(|t| aggregator.process_trade(t))
        .collect::<Result<Vec<_>, _>>()?;

    assert_eq!(records[58].indicators.sma(60), None);
    assert_eq!(records[59].indicators.sma(60), Some(30.5));
    assert_eq!(records[59].indicators.ema(60), Some(30.5));
    assert_eq!(records[59].indicators.rsi(60), None);
    assert_eq!(records[60].indicators.rsi(60), Some(100.0));
    assert_eq!(records[60].candle.window_start_ms, 1_700_000_040_000 + 60 * 60_000);
    Ok(())
}
