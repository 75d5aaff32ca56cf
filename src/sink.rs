//! Downstream destinations for range results.

use crate::error::{Error, Result};
use crate::query::RangeQueryResult;
use crate::schema::AggregateSchema;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn emit(&self, result: RangeQueryResult) -> Result<()>;
}

/// Forwards results over a tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<RangeQueryResult>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<RangeQueryResult>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ResultSink for ChannelSink {
    async fn emit(&self, result: RangeQueryResult) -> Result<()> {
        self.tx
            .send(result)
            .await
            .map_err(|e| Error::Sink(format!("result channel closed, dropped {}", e.0.id)))
    }
}

/// Keeps every result in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    results: Mutex<Vec<RangeQueryResult>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted since the last call.
    pub fn take(&self) -> Vec<RangeQueryResult> {
        std::mem::take(&mut *self.results.lock())
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }
}

#[async_trait]
impl ResultSink for CollectingSink {
    async fn emit(&self, result: RangeQueryResult) -> Result<()> {
        self.results.lock().push(result);
        Ok(())
    }
}

/// Writes one JSON result message per line.
pub struct JsonLinesSink<W> {
    writer: tokio::sync::Mutex<W>,
    schema: Arc<AggregateSchema>,
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W, schema: Arc<AggregateSchema>) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
            schema,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> ResultSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, result: RangeQueryResult) -> Result<()> {
        let mut line = serde_json::to_vec(&result.to_message(&self.schema))?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}
