//! Change-data-capture: best-effort publishing of committed mutations.
//!
//! Events are handed to a background worker over a bounded queue *after*
//! the write has committed (WAL fsynced, memtable applied). The publisher
//! never blocks or fails the write path: when the queue is full the event
//! is dropped and a counter incremented, making delivery at-most-once from
//! the engine's perspective. The message-bus transport itself lives behind
//! [`CdcSink`].

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use kura_core::config::CdcConfig;
use kura_core::error::Result;
use kura_core::metrics::Metrics;

/// One committed mutation as seen by downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub timestamp: u64,
    pub shard_id: u32,
    pub method: String,
    pub key: String,
    pub value: String,
}

/// Transport behind the publisher; the actual message bus is an external
/// collaborator.
#[async_trait]
pub trait CdcSink: Send + Sync {
    /// Forward one serialized event, keyed for partitioning.
    async fn publish(&self, key: &[u8], payload: &[u8]) -> Result<()>;
}

/// Default sink: logs events instead of shipping them anywhere.
pub struct LogSink;

#[async_trait]
impl CdcSink for LogSink {
    async fn publish(&self, key: &[u8], payload: &[u8]) -> Result<()> {
        debug!(
            key = %String::from_utf8_lossy(key),
            bytes = payload.len(),
            "change event"
        );
        Ok(())
    }
}

/// Handle owned by the engine; cheap to call from the write path.
pub struct CdcPublisher {
    tx: mpsc::Sender<ChangeEvent>,
    shard_id: u32,
    metrics: Metrics,
}

impl CdcPublisher {
    /// Spawn the consumer worker over a bounded queue.
    pub fn new(sink: Arc<dyn CdcSink>, config: &CdcConfig, shard_id: u32, metrics: Metrics) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        tokio::spawn(consume(rx, sink, metrics.clone()));

        Self {
            tx,
            shard_id,
            metrics,
        }
    }

    /// Enqueue a committed mutation; drops on overflow.
    pub fn publish(&self, method: &'static str, key: &[u8], value: Option<&[u8]>) {
        let event = ChangeEvent {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            shard_id: self.shard_id,
            method: method.to_string(),
            key: String::from_utf8_lossy(key).into_owned(),
            value: value
                .map(|v| String::from_utf8_lossy(v).into_owned())
                .unwrap_or_default(),
        };

        if self.tx.try_send(event).is_err() {
            self.metrics.record_cdc_dropped();
        }
    }
}

async fn consume(mut rx: mpsc::Receiver<ChangeEvent>, sink: Arc<dyn CdcSink>, metrics: Metrics) {
    while let Some(event) = rx.recv().await {
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => {
                warn!("failed to serialize change event: {e}");
                continue;
            }
        };

        match sink.publish(event.key.as_bytes(), &payload).await {
            Ok(()) => metrics.record_cdc_published(),
            Err(e) => warn!(key = %event.key, "change event publish failed: {e}"),
        }
    }
    debug!("CDC worker stopped");
}
