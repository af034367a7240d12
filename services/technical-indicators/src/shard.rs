//! Key-sharded processing engine
//!
//! Each shard is a tokio task that exclusively owns one [`Aggregator`].
//! Events are routed by the hash of their series key, so every key has a
//! single writer and its records leave in arrival order. Snapshots and
//! restores travel through the same queue as events.

use crate::aggregators::{Aggregator, AggregatorStats, EmittedRecord};
use crate::config::IndicatorConfig;
use crate::errors::{CheckpointError, ConfigError};
use crate::history::KeyState;
use crate::sink::RecordSink;
use crate::types::{Candle, SeriesKey, Trade};
use anyhow::{Context, Result, anyhow};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Commands accepted by a shard
#[derive(Debug)]
pub enum ShardCommand {
    /// Fold a trade
    Trade(Trade),
    /// Upsert an upstream candle
    Candle(Candle),
    /// Return copies of every series state
    Snapshot(oneshot::Sender<Vec<(SeriesKey, KeyState)>>),
    /// Install a series state
    Restore(SeriesKey, KeyState, oneshot::Sender<Result<(), CheckpointError>>),
}

/// Totals reported when the engine stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Merged per-shard counters
    pub aggregate: AggregatorStats,
    /// Series tracked across all shards
    pub series: usize,
    /// Records accepted by the sink
    pub delivered: u64,
}

struct ShardExit {
    stats: AggregatorStats,
    series: usize,
}

/// Sharded aggregation engine
pub struct ShardedEngine {
    candle_seconds: u64,
    senders: Vec<mpsc::Sender<ShardCommand>>,
    workers: Vec<JoinHandle<ShardExit>>,
    sink_task: JoinHandle<Result<u64>>,
}

impl ShardedEngine {
    /// Start `config.shards` workers feeding `sink`
    pub fn spawn<S>(config: &IndicatorConfig, sink: S) -> Result<Self, ConfigError>
    where
        S: RecordSink + 'static,
    {
        config.validate()?;

        let (out_tx, out_rx) = mpsc::channel(config.channel_capacity);
        let mut senders = Vec::with_capacity(config.shards);
        let mut workers = Vec::with_capacity(config.shards);

        for shard in 0..config.shards {
            let (tx, rx) = mpsc::channel(config.channel_capacity);
            let aggregator = Aggregator::new(config)?;
            workers.push(tokio::spawn(run_shard(shard, aggregator, rx, out_tx.clone())));
            senders.push(tx);
        }
        drop(out_tx);

        let sink_task = tokio::spawn(drain_to_sink(out_rx, sink));

        info!(
            shards = config.shards,
            candle_seconds = config.candle_seconds,
            capacity = config.max_candles_in_state,
            "indicator engine started"
        );

        Ok(Self {
            candle_seconds: config.candle_seconds,
            senders,
            workers,
            sink_task,
        })
    }

    /// Number of shards
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.senders.len()
    }

    /// Shard owning `key`
    #[must_use]
    pub fn shard_for(&self, key: &SeriesKey) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        // Modulo keeps the value below the shard count, which is a usize
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    async fn send(&self, shard: usize, command: ShardCommand) -> Result<()> {
        self.senders[shard]
            .send(command)
            .await
            .map_err(|_| anyhow!("shard {shard} stopped"))
    }

    /// Queue a trade on its shard
    pub async fn submit_trade(&self, trade: Trade) -> Result<()> {
        let shard = self.shard_for(&SeriesKey::new(trade.pair.clone(), self.candle_seconds));
        self.send(shard, ShardCommand::Trade(trade)).await
    }

    /// Queue an upstream candle on its shard
    pub async fn submit_candle(&self, candle: Candle) -> Result<()> {
        let shard = self.shard_for(&candle.series_key());
        self.send(shard, ShardCommand::Candle(candle)).await
    }

    /// Snapshot every series on every shard, ordered by key
    pub async fn snapshot(&self) -> Result<Vec<(SeriesKey, KeyState)>> {
        let mut all = Vec::new();
        for shard in 0..self.senders.len() {
            let (tx, rx) = oneshot::channel();
            self.send(shard, ShardCommand::Snapshot(tx)).await?;
            all.extend(rx.await.with_context(|| format!("shard {shard} dropped snapshot"))?);
        }
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }

    /// Restore series states onto their owning shards
    pub async fn restore(&self, entries: Vec<(SeriesKey, KeyState)>) -> Result<usize> {
        let mut restored = 0;
        for (key, state) in entries {
            let shard = self.shard_for(&key);
            let (tx, rx) = oneshot::channel();
            self.send(shard, ShardCommand::Restore(key.clone(), state, tx)).await?;
            match rx.await.with_context(|| format!("shard {shard} dropped restore"))? {
                Ok(()) => restored += 1,
                Err(err) => warn!(series = %key, error = %err, "skipping invalid checkpoint entry"),
            }
        }
        Ok(restored)
    }

    /// Drain queues, stop workers and flush the sink
    pub async fn shutdown(self) -> Result<EngineStats> {
        drop(self.senders);

        let mut stats = EngineStats::default();
        let mut first_failure = None;
        for (shard, worker) in self.workers.into_iter().enumerate() {
            match worker.await {
                Ok(exit) => {
                    stats.aggregate.merge(&exit.stats);
                    stats.series += exit.series;
                }
                Err(err) => {
                    error!(shard, error = %err, "shard task failed");
                    first_failure.get_or_insert(anyhow!("shard {shard} failed: {err}"));
                }
            }
        }

        // Workers are gone, so the record channel is closed and the sink drains and flushes
        stats.delivered = self.sink_task.await.context("sink task panicked")??;
        if let Some(err) = first_failure {
            return Err(err);
        }

        info!(
            emitted = stats.aggregate.emitted,
            delivered = stats.delivered,
            late_dropped = stats.aggregate.late_dropped,
            malformed = stats.aggregate.malformed,
            ignored = stats.aggregate.ignored,
            series = stats.series,
            "indicator engine stopped"
        );
        Ok(stats)
    }
}

async fn run_shard(
    shard: usize,
    mut aggregator: Aggregator,
    mut rx: mpsc::Receiver<ShardCommand>,
    out: mpsc::Sender<EmittedRecord>,
) -> ShardExit {
    debug!(shard, "shard started");

    while let Some(command) = rx.recv().await {
        let record = match command {
            ShardCommand::Trade(trade) => match aggregator.process_trade(&trade) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(shard, error = %err, "dropping trade");
                    None
                }
            },
            ShardCommand::Candle(candle) => match aggregator.process_candle(candle) {
                Ok(record) => record,
                Err(err) => {
                    warn!(shard, error = %err, "dropping candle");
                    None
                }
            },
            ShardCommand::Snapshot(reply) => {
                // Receiver may have given up; nothing to undo
                let _ = reply.send(aggregator.snapshot_all());
                None
            }
            ShardCommand::Restore(key, state, reply) => {
                let _ = reply.send(aggregator.restore(key, state));
                None
            }
        };

        if let Some(record) = record {
            if out.send(record).await.is_err() {
                error!(shard, "record sink closed, stopping shard");
                break;
            }
        }
    }

    debug!(shard, series = aggregator.series_count(), "shard stopped");
    ShardExit {
        stats: aggregator.stats(),
        series: aggregator.series_count(),
    }
}

async fn drain_to_sink<S: RecordSink>(mut rx: mpsc::Receiver<EmittedRecord>, mut sink: S) -> Result<u64> {
    let mut delivered = 0u64;
    while let Some(record) = rx.recv().await {
        sink.emit(record).await?;
        delivered += 1;
    }
    sink.flush().await?;
    Ok(delivered)
}
