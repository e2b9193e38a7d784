//! # Engine Tests
//!
//! Read-overlay ordering, tombstone masking, inline flush behavior,
//! lifecycle state checks and directory ownership.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;

use kura_core::error::Error;
use kura_core::metrics::Metrics;
use kura_core::traits::KvStore;
use kura_storage::{Engine, EngineConfig, EngineState};

fn b(s: &str) -> Bytes {
    Bytes::from(s.to_string())
}

async fn open_engine(dir: &Path) -> Engine {
    Engine::open(EngineConfig::new(dir), None, Metrics::new())
        .await
        .unwrap()
}

async fn open_engine_with_threshold(dir: &Path, flush_bytes: usize) -> Engine {
    let config = EngineConfig {
        memtable_flush_bytes: flush_bytes,
        ..EngineConfig::new(dir)
    };
    Engine::open(config, None, Metrics::new()).await.unwrap()
}

fn get_str(engine: &Engine, key: &str) -> Option<String> {
    engine
        .get(key.as_bytes())
        .unwrap()
        .map(|v| String::from_utf8_lossy(&v).into_owned())
}

fn sstable_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "sst").unwrap_or(false))
        .count()
}

// =============================================================================
// Basic read/write semantics
// =============================================================================

#[tokio::test]
async fn test_set_then_get() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    engine.put(b("a"), b("1")).unwrap();
    engine.put(b("b"), b("2")).unwrap();
    engine.put(b("c"), b("3")).unwrap();

    assert_eq!(get_str(&engine, "a").as_deref(), Some("1"));
    assert_eq!(get_str(&engine, "b").as_deref(), Some("2"));
    assert_eq!(get_str(&engine, "c").as_deref(), Some("3"));
    assert_eq!(get_str(&engine, "d"), None);
}

#[tokio::test]
async fn test_overwrite_returns_latest() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    engine.put(b("k"), b("v1")).unwrap();
    engine.put(b("k"), b("v2")).unwrap();

    assert_eq!(get_str(&engine, "k").as_deref(), Some("v2"));
}

#[tokio::test]
async fn test_repeated_set_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    for _ in 0..5 {
        engine.put(b("k"), b("v")).unwrap();
    }
    engine.flush().unwrap();
    for _ in 0..5 {
        engine.put(b("k"), b("v")).unwrap();
    }

    assert_eq!(get_str(&engine, "k").as_deref(), Some("v"));
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    engine.put(b("k"), b("v")).unwrap();
    engine.delete(b("k")).unwrap();

    assert_eq!(get_str(&engine, "k"), None);
}

#[tokio::test]
async fn test_delete_masks_older_sstable_versions() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    engine.put(b("k"), b("v")).unwrap();
    engine.flush().unwrap();
    // The old value now lives in an SSTable; the tombstone must mask it
    // both from the memtable and, after another flush, from a newer table.
    engine.delete(b("k")).unwrap();
    assert_eq!(get_str(&engine, "k"), None);

    engine.flush().unwrap();
    assert_eq!(get_str(&engine, "k"), None);
}

#[tokio::test]
async fn test_delete_of_unseen_key_is_not_found() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    engine.delete(b("ghost")).unwrap();
    assert_eq!(get_str(&engine, "ghost"), None);

    engine.flush().unwrap();
    assert_eq!(get_str(&engine, "ghost"), None);
}

#[tokio::test]
async fn test_memtable_beats_sstable() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    engine.put(b("k"), b("v")).unwrap();
    engine.flush().unwrap();
    engine.put(b("k"), b("v2")).unwrap();

    assert_eq!(get_str(&engine, "k").as_deref(), Some("v2"));
}

#[tokio::test]
async fn test_empty_key_and_value() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    engine.put(Bytes::new(), Bytes::new()).unwrap();
    assert_eq!(engine.get(b"").unwrap(), Some(Bytes::new()));
    assert_eq!(engine.get(b"missing").unwrap(), None);
}

// =============================================================================
// Flush behavior
// =============================================================================

#[tokio::test]
async fn test_forced_flush_between_any_two_operations_preserves_reads() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    let ops: [(&str, Option<&str>); 6] = [
        ("a", Some("1")),
        ("b", Some("2")),
        ("a", Some("1b")),
        ("c", Some("3")),
        ("b", None),
        ("d", Some("4")),
    ];

    for (key, value) in ops {
        engine.flush().unwrap();
        match value {
            Some(v) => engine.put(b(key), b(v)).unwrap(),
            None => engine.delete(b(key)).unwrap(),
        }
    }
    engine.flush().unwrap();

    assert_eq!(get_str(&engine, "a").as_deref(), Some("1b"));
    assert_eq!(get_str(&engine, "b"), None);
    assert_eq!(get_str(&engine, "c").as_deref(), Some("3"));
    assert_eq!(get_str(&engine, "d").as_deref(), Some("4"));
}

#[tokio::test]
async fn test_flush_of_empty_memtable_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    engine.flush().unwrap();
    engine.flush().unwrap();
    assert_eq!(sstable_count(dir.path()), 0);
    assert_eq!(engine.state(), EngineState::Ready);
}

#[tokio::test]
async fn test_threshold_triggers_inline_flush() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine_with_threshold(dir.path(), 256).await;

    for i in 0..20 {
        engine
            .put(b(&format!("key{i:02}")), b(&"x".repeat(64)))
            .unwrap();
    }

    assert!(sstable_count(dir.path()) >= 1, "threshold never tripped");
    assert_eq!(engine.state(), EngineState::Ready);

    // Every write is still visible through the overlay.
    for i in 0..20 {
        assert_eq!(
            get_str(&engine, &format!("key{i:02}")).as_deref(),
            Some("x".repeat(64).as_str())
        );
    }

    // The WAL only holds what the memtable holds (rotated at each flush).
    let wal_len = std::fs::metadata(dir.path().join("wal.log")).unwrap().len();
    assert!(wal_len < 20 * 64, "WAL was not rotated at flush");
}

// =============================================================================
// Lifecycle + ownership
// =============================================================================

#[tokio::test]
async fn test_double_open_is_a_conflict() {
    let dir = TempDir::new().unwrap();
    let _engine = open_engine(dir.path()).await;

    let err = Engine::open(EngineConfig::new(dir.path()), None, Metrics::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
}

#[tokio::test]
async fn test_lock_released_on_drop() {
    let dir = TempDir::new().unwrap();
    {
        let _engine = open_engine(dir.path()).await;
    }
    // The lock is gone; a second open succeeds.
    let _engine = open_engine(dir.path()).await;
}

#[tokio::test]
async fn test_closed_engine_rejects_operations() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    engine.put(b("k"), b("v")).unwrap();
    engine.close().unwrap();
    engine.close().unwrap();
    assert_eq!(engine.state(), EngineState::Closed);

    assert!(matches!(
        engine.put(b("k"), b("v2")).unwrap_err(),
        Error::NotReady { .. }
    ));
    assert!(matches!(
        engine.get(b"k").unwrap_err(),
        Error::NotReady { .. }
    ));
    assert!(matches!(
        engine.delete(b("k")).unwrap_err(),
        Error::NotReady { .. }
    ));
}

#[tokio::test]
async fn test_close_flushes_pending_writes() {
    let dir = TempDir::new().unwrap();
    let engine = open_engine(dir.path()).await;

    engine.put(b("k"), b("v")).unwrap();
    engine.close().unwrap();

    assert_eq!(sstable_count(dir.path()), 1);
    assert_eq!(std::fs::metadata(dir.path().join("wal.log")).unwrap().len(), 0);
}

#[tokio::test]
async fn test_engine_through_kv_store_trait() {
    let dir = TempDir::new().unwrap();
    let engine: Arc<dyn KvStore> = Arc::new(open_engine(dir.path()).await);

    engine.put(b("k"), b("v")).await.unwrap();
    assert_eq!(engine.get(b"k").await.unwrap(), Some(b("v")));

    engine.delete(b("k")).await.unwrap();
    assert_eq!(engine.get(b"k").await.unwrap(), None);

    engine.flush().await.unwrap();
    engine.close().await.unwrap();
}

#[tokio::test]
async fn test_metrics_track_writes_and_flushes() {
    let dir = TempDir::new().unwrap();
    let metrics = Metrics::new();
    let engine = Engine::open(EngineConfig::new(dir.path()), None, metrics.clone())
        .await
        .unwrap();

    engine.put(b("k"), b("v")).unwrap();
    engine.flush().unwrap();

    let rendered = metrics.render();
    assert!(rendered.contains("wal_appends_total 1"));
    assert!(rendered.contains("memtable_flushes_total 1"));
}
