//! Tests for checkpoint persistence

use anyhow::Result;
use byteorder::{LittleEndian, WriteBytesExt};
use rstest::*;
use std::io::Cursor;
use std::num::NonZeroUsize;
use technical_indicators::storage::checkpoint::{read_checkpoint, read_header, write_checkpoint};
use technical_indicators::{CheckpointError, CheckpointStore, KeyState, SeriesKey, StateStore};
use tempfile::TempDir;
use test_utils::{CandleFactory, assert_err_matches};

/// Test fixture for creating a temporary directory
#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

fn state(pair: &str, closes: &[f64]) -> (SeriesKey, KeyState) {
    let mut state = KeyState::new(NonZeroUsize::new(16).expect("non-zero"));
    for candle in CandleFactory::new(pair, 60).series(closes) {
        state.upsert(candle);
    }
    (SeriesKey::new(pair, 60), state)
}

#[rstest]
fn test_multiple_series_round_trip(temp_dir: TempDir) -> Result<()> {
    let mut store = CheckpointStore::new(temp_dir.path().join("indicators.ckpt"));
    let entries = vec![
        state("BTC/USD", &[64_000.0, 64_010.5, 63_990.25]),
        state("ETH/USD", &[3_000.0]),
        state("SOL/USD", &[0.1 + 0.2, 1e-9, 1e12]),
    ];

    store.save(&entries)?;
    assert_eq!(store.load()?, entries);
    Ok(())
}

#[rstest]
fn test_save_replaces_previous_checkpoint(temp_dir: TempDir) -> Result<()> {
    let mut store = CheckpointStore::new(temp_dir.path().join("indicators.ckpt"));
    store.save(&[state("BTC/USD", &[1.0, 2.0])])?;
    store.save(&[state("ETH/USD", &[3.0])])?;

    let loaded = store.load()?;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].0, SeriesKey::new("ETH/USD", 60));
    assert!(!temp_dir.path().join("indicators.ckpt.tmp").exists());
    Ok(())
}

#[test]
fn test_header_reports_entry_count() -> Result<()> {
    let mut buf = Vec::new();
    write_checkpoint(&mut buf, &[state("A", &[1.0]), state("B", &[2.0])])?;

    let header = read_header(&mut Cursor::new(&buf))?;
    assert_eq!(header.entries, 2);
    Ok(())
}

#[test]
fn test_future_version_rejected() -> Result<()> {
    let mut buf = Vec::new();
    write_checkpoint(&mut buf, &[state("A", &[1.0])])?;
    let mut patched = Cursor::new(&mut buf);
    patched.set_position(4);
    patched.write_u32::<LittleEndian>(99)?;

    assert_err_matches!(
        read_checkpoint(&mut Cursor::new(&buf)),
        CheckpointError::UnsupportedVersion(99)
    );
    Ok(())
}

#[test]
fn test_truncated_checkpoint_is_io_error() -> Result<()> {
    let mut buf = Vec::new();
    write_checkpoint(&mut buf, &[state("A", &[1.0, 2.0, 3.0])])?;
    buf.truncate(buf.len() - 5);

    assert_err_matches!(read_checkpoint(&mut Cursor::new(&buf)), CheckpointError::Io(_));
    Ok(())
}

#[test]
fn test_state_over_capacity_rejected_on_read() -> Result<()> {
    let (key, full) = state("A", &[1.0, 2.0, 3.0]);
    let mut json = serde_json::to_value(&full)?;
    json["capacity"] = serde_json::json!(2);
    let broken: KeyState = serde_json::from_value(json)?;

    let mut buf = Vec::new();
    write_checkpoint(&mut buf, &[(key, broken)])?;

    assert_err_matches!(
        read_checkpoint(&mut Cursor::new(&buf)),
        CheckpointError::InvalidState(_)
    );
    Ok(())
}
