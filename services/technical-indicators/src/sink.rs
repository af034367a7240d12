//! Outbound record sinks

use crate::aggregators::EmittedRecord;
use crate::codec::encode_record;
use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

/// Destination for emitted records
#[async_trait]
pub trait RecordSink: Send {
    /// Deliver one record
    async fn emit(&mut self, record: EmittedRecord) -> Result<()>;

    /// Push buffered records out
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W: AsyncWrite + Unpin + Send> {
    writer: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    /// Wrap an async writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Unwrap the inner writer, dropping anything not yet flushed
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> RecordSink for JsonLinesSink<W> {
    async fn emit(&mut self, record: EmittedRecord) -> Result<()> {
        let mut line = encode_record(&record)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Forwards records to a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EmittedRecord>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes it
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EmittedRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl RecordSink for ChannelSink {
    async fn emit(&mut self, record: EmittedRecord) -> Result<()> {
        self.tx
            .send(record)
            .map_err(|_| anyhow::anyhow!("record receiver dropped"))
    }
}
