//! Inspect a checkpoint file: header plus one summary line per series

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use technical_indicators::storage::checkpoint::read_checkpoint;

#[derive(Parser, Debug)]
#[clap(name = "checkpoint_dump")]
#[clap(about = "Print the contents of an indicator checkpoint")]
struct Args {
    /// Checkpoint file
    path: PathBuf,

    /// Also print every candle
    #[clap(long)]
    candles: bool,
}

fn format_ms(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms).map_or_else(|| ms.to_string(), |dt| dt.to_rfc3339())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let file = File::open(&args.path)
        .with_context(|| format!("failed to open {}", args.path.display()))?;
    let (header, entries) = read_checkpoint(&mut BufReader::new(file))?;

    println!("Checkpoint {}", args.path.display());
    println!("  Version: {}", header.version);
    println!("  Entries: {}", header.entries);

    for entry in &entries {
        let newest = entry
            .state
            .current()
            .map_or_else(|| "-".to_string(), |c| format_ms(c.window_start_ms));
        println!(
            "{:<20} {:>6}s  {:>4}/{:<4} candles  newest window {}",
            entry.key.pair,
            entry.key.candle_seconds,
            entry.state.len(),
            entry.state.capacity(),
            newest
        );

        if args.candles {
            for c in entry.state.history() {
                println!(
                    "    {}  o={} h={} l={} c={} v={}",
                    format_ms(c.window_start_ms),
                    c.open,
                    c.high,
                    c.low,
                    c.close,
                    c.volume
                );
            }
        }
    }

    Ok(())
}
