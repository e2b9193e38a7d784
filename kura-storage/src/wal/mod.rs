//! Write-ahead log: append-only durable record of mutations.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      WAL File Layout                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Record 1: [payload_len u32][crc32 u32][payload]            │
//! │  Record 2: [payload_len u32][crc32 u32][payload]            │
//! │  ...                                                        │
//! │  Record N: possibly torn by a crash mid-write               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `append` fsyncs before returning, so an acknowledged mutation
//! survives a crash. A background task additionally fsyncs on an interval to
//! bound loss for bytes buffered by the host. Replay scans from the start
//! and stops silently at the first truncated or corrupt record *at the
//! tail*; a corrupt record with valid data after it is mid-log corruption
//! and fails the scan.

mod record;

pub use record::{Operation, Record, HEADER_SIZE, PAYLOAD_FIXED};

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use kura_core::error::{Error, Result};

/// Append-only log with its own internal lock. All mutating operations
/// serialize on it; `replay` assumes the log is quiescent (engine startup).
pub struct Wal {
    path: PathBuf,
    file: Arc<Mutex<Option<File>>>,
    shutdown: watch::Sender<bool>,
    max_record_bytes: usize,
}

impl Wal {
    /// Open or create the log, positioned at the end, and start the
    /// background sync task.
    pub fn open(
        path: impl AsRef<Path>,
        sync_interval: Duration,
        max_record_bytes: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        let file = Arc::new(Mutex::new(Some(file)));

        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(background_sync(
            Arc::clone(&file),
            sync_interval,
            shutdown_rx,
        ));

        Ok(Self {
            path,
            file,
            shutdown,
            max_record_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and fsync before returning, making the mutation
    /// crash-safe once this call succeeds.
    pub fn append(&self, record: &Record) -> Result<u64> {
        let encoded = record.encode();
        if encoded.len() > self.max_record_bytes {
            return Err(Error::RecordTooLarge {
                size: encoded.len(),
                limit: self.max_record_bytes,
            });
        }

        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or_else(|| Error::NotReady {
            state: "wal closed".to_string(),
        })?;

        file.write_all(&encoded)
            .map_err(|e| Error::io(format!("appending to WAL {}", self.path.display()), e))?;
        file.sync_all()
            .map_err(|e| Error::io(format!("syncing WAL {}", self.path.display()), e))?;

        Ok(encoded.len() as u64)
    }

    /// Force any buffered bytes to durable storage.
    pub fn sync(&self) -> Result<()> {
        let guard = self.file.lock();
        if let Some(file) = guard.as_ref() {
            file.sync_all()
                .map_err(|e| Error::io(format!("syncing WAL {}", self.path.display()), e))?;
        }
        Ok(())
    }

    /// Scan the log from the beginning, yielding each valid record.
    ///
    /// A truncated or corrupt tail terminates the scan cleanly: a partial
    /// final record reflects a crash mid-write and was never acknowledged.
    /// A corrupt record that is *not* the last one in the file returns
    /// [`Error::Corruption`] so the caller refuses to start on silently
    /// missing data.
    pub fn replay<F>(&self, mut handler: F) -> Result<()>
    where
        F: FnMut(Record) -> Result<()>,
    {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::io(format!("opening WAL {}", self.path.display()), e)),
        };
        let file_len = file
            .metadata()
            .map_err(|e| Error::io("reading WAL metadata", e))?
            .len();

        let mut offset: u64 = 0;
        let mut header = [0u8; HEADER_SIZE];
        loop {
            if let Err(e) = file.read_exact(&mut header) {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    // Clean EOF, or a header torn by a crash.
                    return Ok(());
                }
                return Err(Error::io("reading WAL record header", e));
            }
            offset += HEADER_SIZE as u64;

            let payload_len = BigEndian::read_u32(&header[0..4]) as u64;
            let checksum = BigEndian::read_u32(&header[4..8]);

            if offset + payload_len > file_len {
                debug!(offset, payload_len, "truncated record at WAL tail, stopping replay");
                return Ok(());
            }

            let mut payload = vec![0u8; payload_len as usize];
            if let Err(e) = file.read_exact(&mut payload) {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    return Ok(());
                }
                return Err(Error::io("reading WAL record payload", e));
            }
            offset += payload_len;

            match Record::decode_payload(&payload, checksum) {
                Ok(record) => handler(record)?,
                Err(e) if offset == file_len => {
                    // The prefix is valid; the torn final record was never
                    // acknowledged.
                    debug!(offset, "ignoring corrupt record at WAL tail: {e}");
                    return Ok(());
                }
                Err(e) => {
                    return Err(Error::corruption(format!(
                        "mid-log corruption at byte {}: {e}",
                        offset - payload_len - HEADER_SIZE as u64
                    )));
                }
            }
        }
    }

    /// Close, unlink and reopen the log as empty.
    ///
    /// Called after a flush has durably published an SSTable, so none of the
    /// discarded records are still needed for recovery.
    pub fn rotate(&self) -> Result<()> {
        let mut guard = self.file.lock();
        let file = guard.take().ok_or_else(|| Error::NotReady {
            state: "wal closed".to_string(),
        })?;
        file.sync_all()
            .map_err(|e| Error::io(format!("syncing WAL {} before rotate", self.path.display()), e))?;
        drop(file);

        std::fs::remove_file(&self.path)
            .map_err(|e| Error::io(format!("unlinking WAL {}", self.path.display()), e))?;
        *guard = Some(open_append(&self.path)?);

        info!(path = %self.path.display(), "rotated WAL");
        Ok(())
    }

    /// Stop the background sync task and close the file handle; idempotent.
    pub fn close(&self) -> Result<()> {
        let _ = self.shutdown.send(true);
        let mut guard = self.file.lock();
        if let Some(file) = guard.take() {
            file.sync_all()
                .map_err(|e| Error::io(format!("syncing WAL {} on close", self.path.display()), e))?;
        }
        Ok(())
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(format!("opening WAL {}", path.display()), e))
}

/// Periodic fsync to bound data loss for host-buffered writes.
async fn background_sync(
    file: Arc<Mutex<Option<File>>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let guard = file.lock();
                if let Some(f) = guard.as_ref() {
                    if let Err(e) = f.sync_all() {
                        warn!("background WAL sync failed: {e}");
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!("stopping WAL sync task");
                break;
            }
        }
    }
}
