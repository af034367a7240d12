//! Technical Indicators Service - streaming runtime
//!
//! Reads trades (or upstream candles) as JSON lines, aggregates them into
//! candles, computes indicators and writes one JSON record per accepted
//! event to stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use technical_indicators::codec::{InboundEvent, decode_event};
use technical_indicators::{
    CheckpointStore, IndicatorConfig, JsonLinesSink, ShardedEngine, StateStore,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "technical-indicators";

/// Streaming candle and indicator service
#[derive(Parser, Debug)]
#[clap(name = "technical-indicators")]
#[clap(about = "Aggregates trades into candles and streaming technical indicators")]
struct Cli {
    /// Optional TOML configuration file
    #[clap(long, short)]
    config: Option<PathBuf>,

    /// Input file of JSON lines; stdin when omitted or `-`
    #[clap(long, short)]
    input: Option<PathBuf>,

    /// Checkpoint file restored at startup and written at shutdown
    #[clap(long, env = "INDICATORS_CHECKPOINT")]
    checkpoint: Option<PathBuf>,

    /// Override candle duration in seconds
    #[clap(long)]
    candle_seconds: Option<u64>,

    /// Override per-series history capacity
    #[clap(long)]
    max_candles_in_state: Option<usize>,

    /// Override number of worker shards
    #[clap(long)]
    shards: Option<usize>,
}

impl Cli {
    fn resolve_config(&self) -> Result<IndicatorConfig> {
        let mut config = IndicatorConfig::load(self.config.as_deref())?;
        if let Some(secs) = self.candle_seconds {
            config.candle_seconds = secs;
        }
        if let Some(capacity) = self.max_candles_in_state {
            config.max_candles_in_state = capacity;
        }
        if let Some(shards) = self.shards {
            config.shards = shards;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    info!("Starting Technical Indicators Service v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.resolve_config().context("invalid configuration")?;
    let engine = ShardedEngine::spawn(&config, JsonLinesSink::new(tokio::io::stdout()))?;

    let mut store = cli.checkpoint.clone().map(CheckpointStore::new);
    if let Some(store) = &store {
        let entries = store.load().context("failed to read checkpoint")?;
        let restored = engine.restore(entries).await?;
        info!(restored, path = %store.path().display(), "restored series from checkpoint");
    }

    let lines = match cli.input.as_deref() {
        Some(path) if path.as_os_str() != "-" => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            pump(&engine, file).await
        }
        _ => pump(&engine, tokio::io::stdin()).await,
    };
    if let Err(e) = &lines {
        error!("Input stream failed: {:#}", e);
    }

    if let Some(store) = &mut store {
        let snapshot = engine.snapshot().await?;
        store.save(&snapshot).context("failed to write checkpoint")?;
    }

    let stats = engine.shutdown().await?;
    info!(
        lines = lines.as_ref().copied().unwrap_or_default(),
        delivered = stats.delivered,
        "Technical Indicators Service finished"
    );
    lines.map(|_| ())
}

/// Feed every line of `input` into the engine until EOF or Ctrl-C
async fn pump<R: AsyncRead + Unpin>(engine: &ShardedEngine, input: R) -> Result<u64> {
    let mut lines = BufReader::new(input).lines();
    let mut count = 0u64;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, draining in-flight events");
                break;
            }
        };
        let Some(line) = line else { break };
        count += 1;

        if line.trim().is_empty() {
            continue;
        }
        match decode_event(&line) {
            Ok(InboundEvent::Trade(trade)) => engine.submit_trade(trade).await?,
            Ok(InboundEvent::Candle(candle)) => engine.submit_candle(candle).await?,
            Err(e) => warn!(line = count, error = %e, "skipping malformed event"),
        }
    }
    Ok(count)
}

/// Initialize tracing with environment filter; logs go to stderr
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", SERVICE_NAME.replace('-', "_")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .with_thread_names(true),
        )
        .init();

    Ok(())
}
