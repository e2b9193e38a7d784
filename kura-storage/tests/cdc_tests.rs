//! # CDC Publisher Tests
//!
//! Delivery of committed mutations, drop-on-overflow accounting, and the
//! guarantee that publishing never blocks the write path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;

use kura_core::config::CdcConfig;
use kura_core::error::Result;
use kura_core::metrics::Metrics;
use kura_storage::{CdcPublisher, CdcSink, ChangeEvent, Engine, EngineConfig};

/// Forwards every payload to a test channel.
struct ChannelSink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl CdcSink for ChannelSink {
    async fn publish(&self, _key: &[u8], payload: &[u8]) -> Result<()> {
        let _ = self.tx.send(payload.to_vec());
        Ok(())
    }
}

/// Parks until the test hands out permits, holding the worker busy.
struct StalledSink {
    gate: Arc<Semaphore>,
}

#[async_trait]
impl CdcSink for StalledSink {
    async fn publish(&self, _key: &[u8], _payload: &[u8]) -> Result<()> {
        let _permit = self.gate.acquire().await;
        Ok(())
    }
}

fn config(queue_capacity: usize) -> CdcConfig {
    CdcConfig {
        enabled: true,
        queue_capacity,
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> ChangeEvent {
    let payload = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for change event")
        .expect("sink channel closed");
    serde_json::from_slice(&payload).unwrap()
}

#[tokio::test]
async fn test_events_are_delivered_with_shard_and_method() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let publisher = CdcPublisher::new(
        Arc::new(ChannelSink { tx }),
        &config(16),
        3,
        Metrics::new(),
    );

    publisher.publish("SET", b"user:1", Some(b"alice"));
    publisher.publish("DELETE", b"user:2", None);

    let event = next_event(&mut rx).await;
    assert_eq!(event.method, "SET");
    assert_eq!(event.shard_id, 3);
    assert_eq!(event.key, "user:1");
    assert_eq!(event.value, "alice");

    let event = next_event(&mut rx).await;
    assert_eq!(event.method, "DELETE");
    assert_eq!(event.key, "user:2");
    assert_eq!(event.value, "");
}

#[tokio::test]
async fn test_overflow_drops_and_counts_instead_of_blocking() {
    let gate = Arc::new(Semaphore::new(0));
    let metrics = Metrics::new();
    let publisher = CdcPublisher::new(
        Arc::new(StalledSink {
            gate: Arc::clone(&gate),
        }),
        &config(1),
        0,
        metrics.clone(),
    );

    // The worker stalls on the first event it picks up; the queue holds one
    // more; everything beyond that must drop without blocking this thread.
    for i in 0..10 {
        publisher.publish("SET", format!("k{i}").as_bytes(), Some(b"v"));
    }

    assert!(
        metrics.cdc_dropped() >= 8,
        "expected most events dropped, got {}",
        metrics.cdc_dropped()
    );

    gate.add_permits(100);
}

#[tokio::test]
async fn test_engine_publishes_after_commit() {
    let dir = TempDir::new().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let metrics = Metrics::new();
    let publisher = CdcPublisher::new(Arc::new(ChannelSink { tx }), &config(16), 7, metrics.clone());

    let engine = Engine::open(EngineConfig::new(dir.path()), Some(publisher), metrics)
        .await
        .unwrap();

    engine
        .put(Bytes::from_static(b"k"), Bytes::from_static(b"v"))
        .unwrap();
    engine.delete(Bytes::from_static(b"k")).unwrap();

    let event = next_event(&mut rx).await;
    assert_eq!((event.method.as_str(), event.key.as_str()), ("SET", "k"));
    assert_eq!(event.shard_id, 7);

    let event = next_event(&mut rx).await;
    assert_eq!((event.method.as_str(), event.key.as_str()), ("DELETE", "k"));

    // A failed write publishes nothing.
    engine.close().unwrap();
    assert!(engine
        .put(Bytes::from_static(b"x"), Bytes::from_static(b"y"))
        .is_err());
    assert!(
        timeout(Duration::from_millis(200), rx.recv()).await.is_err(),
        "rejected write must not produce a change event"
    );
}
