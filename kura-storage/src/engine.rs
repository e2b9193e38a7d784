//! The per-shard storage engine: composes WAL, memtable and SSTables.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Engine                                │
//! ├──────────────────────────────────────────────────────────────┤
//! │  put/delete:  WAL append+fsync → memtable → (flush?) → CDC   │
//! │  get:         memtable → SSTables newest-first               │
//! │  flush:       memtable → SSTable (fsync) → publish → rotate  │
//! │  open:        discover SSTables → replay WAL → ready         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Durability contract: a mutation is on disk in the WAL before the
//! memtable sees it, so replaying the WAL against an empty memtable after
//! a crash reconstructs the pre-crash table (modulo a torn final record,
//! which was never acknowledged). After a flush rotates the WAL, the log
//! holds nothing older than the published SSTable; a crash between publish
//! and rotate merely redelivers records the overlay order already subsumes.
//!
//! Write-path operations serialize on an exclusive lock; reads share a
//! read lock. The WAL's internal lock is only ever taken while holding the
//! engine lock, so there is no ordering to invert.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use kura_core::config::EngineTuning;
use kura_core::error::{Error, Result};
use kura_core::metrics::Metrics;
use kura_core::traits::KvStore;
use kura_core::types::{Key, Lookup, Value};

use crate::cdc::CdcPublisher;
use crate::lockfile::Lockfile;
use crate::memtable::Memtable;
use crate::sstable::SstableStore;
use crate::wal::{Operation, Record, Wal};

/// Engine lifecycle.
///
/// `Flushing` re-enters `Ready` on success; a failed flush transitions to
/// `Degraded`, where writes are refused but reads continue from existing
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Recovering,
    Ready,
    Flushing,
    Degraded,
    Closed,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Recovering => "recovering",
            EngineState::Ready => "ready",
            EngineState::Flushing => "flushing",
            EngineState::Degraded => "degraded",
            EngineState::Closed => "closed",
        }
    }
}

/// Per-engine configuration; one engine owns one shard directory.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Shard data directory (WAL, SSTables and LOCK live here).
    pub dir: PathBuf,
    /// WAL file name within `dir`.
    pub wal_file: String,
    /// Memtable size that triggers an inline flush on the write path.
    pub memtable_flush_bytes: usize,
    /// Upper bound on a single serialized record.
    pub max_record_bytes: usize,
    /// Interval of the WAL's background fsync task.
    pub wal_sync_interval: Duration,
}

impl EngineConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::from_tuning(dir, &EngineTuning::default(), "wal.log")
    }

    pub fn from_tuning(
        dir: impl Into<PathBuf>,
        tuning: &EngineTuning,
        wal_file: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            wal_file: wal_file.into(),
            memtable_flush_bytes: tuning.memtable_flush_bytes,
            max_record_bytes: tuning.max_record_bytes,
            wal_sync_interval: Duration::from_millis(tuning.wal_sync_interval_ms),
        }
    }
}

struct Inner {
    wal: Wal,
    memtable: Memtable,
    sstables: SstableStore,
}

/// Thread-safe handle to one shard's storage. All three components are
/// owned here; nothing is shared across shards.
pub struct Engine {
    config: EngineConfig,
    state: RwLock<EngineState>,
    inner: RwLock<Inner>,
    cdc: Option<CdcPublisher>,
    metrics: Metrics,
    _lockfile: Lockfile,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Open the engine: acquire the directory lock, discover SSTables,
    /// open the WAL and replay it into a fresh memtable.
    ///
    /// A truncated WAL tail is normal after a crash and does not fail the
    /// open; corruption before the tail does, to avoid silent data loss.
    pub async fn open(
        config: EngineConfig,
        cdc: Option<CdcPublisher>,
        metrics: Metrics,
    ) -> Result<Self> {
        let lockfile = Lockfile::acquire(&config.dir)?;
        info!(dir = %config.dir.display(), "opening storage engine");

        let sstables = SstableStore::open_all(&config.dir, &metrics)?;
        let wal = Wal::open(
            config.dir.join(&config.wal_file),
            config.wal_sync_interval,
            config.max_record_bytes,
        )?;

        let engine = Self {
            config,
            state: RwLock::new(EngineState::Recovering),
            inner: RwLock::new(Inner {
                wal,
                memtable: Memtable::new(),
                sstables,
            }),
            cdc,
            metrics,
            _lockfile: lockfile,
        };

        engine.recover()?;
        *engine.state.write() = EngineState::Ready;
        info!("storage engine ready");
        Ok(engine)
    }

    /// Replay the WAL into the (empty) memtable. SSTables are untouched:
    /// anything the log redelivers that also reached an SSTable is shadowed
    /// by the memtable in overlay order anyway.
    fn recover(&self) -> Result<()> {
        let inner = self.inner.read();
        let mut replayed = 0u64;
        inner.wal.replay(|record| {
            match record.op {
                Operation::Set => inner.memtable.put(record.key, record.value),
                Operation::Delete => inner.memtable.delete(record.key),
            }
            replayed += 1;
            Ok(())
        })?;

        info!(
            records = replayed,
            memtable_bytes = inner.memtable.approx_bytes(),
            "WAL replay complete"
        );
        Ok(())
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Durably store `value` under `key`.
    pub fn put(&self, key: Key, value: Value) -> Result<()> {
        self.write_record(Record::set(key, value))
    }

    /// Durably delete `key`. Deleting a key never seen still installs a
    /// tombstone, so the delete masks any older SSTable value.
    pub fn delete(&self, key: Key) -> Result<()> {
        self.write_record(Record::delete(key))
    }

    fn write_record(&self, record: Record) -> Result<()> {
        let mut inner = self.inner.write();
        self.check_writable()?;

        // WAL first: on failure the memtable is untouched and the error
        // surfaces to the caller without retry.
        let bytes = inner.wal.append(&record)?;
        self.metrics.record_wal_append(bytes);

        match record.op {
            Operation::Set => inner
                .memtable
                .put(record.key.clone(), record.value.clone()),
            Operation::Delete => inner.memtable.delete(record.key.clone()),
        }

        if inner.memtable.approx_bytes() >= self.config.memtable_flush_bytes {
            // Inline flush: the caller that crossed the threshold is
            // charged the flush latency.
            self.flush_locked(&mut inner)?;
        }
        drop(inner);

        // Post-commit, fire-and-forget.
        if let Some(cdc) = &self.cdc {
            match record.op {
                Operation::Set => cdc.publish("SET", &record.key, Some(&record.value)),
                Operation::Delete => cdc.publish("DELETE", &record.key, None),
            }
        }
        Ok(())
    }

    /// Overlay read: memtable first, then SSTables newest to oldest. A
    /// tombstone anywhere masks older values and reads as "not found".
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        let inner = self.inner.read();
        self.check_readable()?;

        let result = match inner.memtable.get(key) {
            Lookup::Miss => inner.sstables.get(key),
            found => found,
        };
        Ok(result.into_option())
    }

    /// Force the memtable out to a new SSTable and rotate the WAL.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.write();
        self.check_writable()?;
        self.flush_locked(&mut inner)
    }

    fn flush_locked(&self, inner: &mut Inner) -> Result<()> {
        if inner.memtable.is_empty() {
            debug!("flush skipped: memtable empty");
            return Ok(());
        }
        *self.state.write() = EngineState::Flushing;

        let Inner {
            wal,
            memtable,
            sstables,
        } = inner;

        let generation = sstables.next_generation();
        info!(
            generation,
            entries = memtable.len(),
            bytes = memtable.approx_bytes(),
            "flushing memtable"
        );

        let table = match sstables.write_from(memtable.iter_sorted(), generation) {
            Ok(table) => table,
            Err(e) => {
                error!(generation, "SSTable write failed, entering degraded mode: {e}");
                *self.state.write() = EngineState::Degraded;
                return Err(e);
            }
        };

        // Publish before rotating: a crash here redelivers records that are
        // now both in the SSTable and the WAL, which overlay order subsumes.
        sstables.register(table);

        if let Err(e) = wal.rotate() {
            error!("WAL rotate failed, entering degraded mode: {e}");
            *self.state.write() = EngineState::Degraded;
            return Err(e);
        }

        memtable.clear();
        self.metrics.record_flush();
        *self.state.write() = EngineState::Ready;
        Ok(())
    }

    /// Flush pending state, close the WAL and release the directory lock
    /// (on drop). Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if self.state() == EngineState::Closed {
            return Ok(());
        }

        if self.state() == EngineState::Ready {
            if let Err(e) = self.flush_locked(&mut inner) {
                warn!("flush during close failed: {e}");
            }
        }

        inner.wal.close()?;
        *self.state.write() = EngineState::Closed;
        info!(dir = %self.config.dir.display(), "storage engine closed");
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        let state = self.state();
        if state != EngineState::Ready {
            return Err(Error::NotReady {
                state: state.as_str().to_string(),
            });
        }
        Ok(())
    }

    fn check_readable(&self) -> Result<()> {
        let state = self.state();
        match state {
            EngineState::Ready | EngineState::Flushing | EngineState::Degraded => Ok(()),
            _ => Err(Error::NotReady {
                state: state.as_str().to_string(),
            }),
        }
    }
}

#[async_trait]
impl KvStore for Engine {
    async fn put(&self, key: Key, value: Value) -> Result<()> {
        Engine::put(self, key, value)
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        Engine::get(self, key)
    }

    async fn delete(&self, key: Key) -> Result<()> {
        Engine::delete(self, key)
    }

    async fn flush(&self) -> Result<()> {
        Engine::flush(self)
    }

    async fn close(&self) -> Result<()> {
        Engine::close(self)
    }
}
