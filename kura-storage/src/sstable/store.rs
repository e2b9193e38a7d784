//! Discovery, ordering and overlay lookup across a shard's SSTables.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kura_core::error::{Error, Result};
use kura_core::metrics::Metrics;
use kura_core::types::Lookup;
use tracing::{info, warn};

use crate::memtable::Entry;
use crate::sstable::{file_name, parse_generation, SstableReader, SstableWriter, QUARANTINE_SUFFIX};

/// The ordered collection of immutable tables for one shard, newest first.
pub struct SstableStore {
    dir: PathBuf,
    /// Newest first: index 0 is the most recent flush.
    tables: Vec<Arc<SstableReader>>,
    next_generation: u64,
}

impl SstableStore {
    /// Discover and validate existing tables at startup.
    ///
    /// Tables that fail footer or structure validation are quarantined
    /// (renamed, never deleted) and logged; the store still opens. The
    /// generation counter continues from the highest name seen, valid or
    /// not, so replacement files never collide.
    pub fn open_all(dir: impl AsRef<Path>, metrics: &Metrics) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::io(format!("creating data directory {}", dir.display()), e))?;

        let mut discovered: Vec<(u64, PathBuf)> = Vec::new();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| Error::io(format!("listing data directory {}", dir.display()), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io("reading directory entry", e))?;
            let path = entry.path();
            if let Some(generation) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_generation)
            {
                discovered.push((generation, path));
            }
        }

        // Newest first.
        discovered.sort_by(|a, b| b.0.cmp(&a.0));
        let next_generation = discovered.first().map(|(g, _)| g + 1).unwrap_or(1);

        let mut tables = Vec::with_capacity(discovered.len());
        for (generation, path) in discovered {
            match SstableReader::open(&path, generation) {
                Ok(reader) => tables.push(Arc::new(reader)),
                Err(e) => {
                    quarantine(&path, &e);
                    metrics.record_quarantine();
                }
            }
        }

        info!(dir = %dir.display(), tables = tables.len(), next_generation, "opened SSTable store");

        Ok(Self {
            dir,
            tables,
            next_generation,
        })
    }

    /// Allocate the generation for the next flush.
    pub fn next_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Write all records from the sorted iterator as one table, fsynced.
    /// The handle is not visible to readers until [`register`] publishes it.
    ///
    /// [`register`]: SstableStore::register
    pub fn write_from<I>(&self, iter: I, generation: u64) -> Result<Arc<SstableReader>>
    where
        I: Iterator<Item = (bytes::Bytes, Entry)>,
    {
        let path = self.dir.join(file_name(generation));
        let mut writer = SstableWriter::create(&path)?;
        for (key, entry) in iter {
            writer.add(&key, &entry)?;
        }
        writer.finish()?;

        Ok(Arc::new(SstableReader::open(&path, generation)?))
    }

    /// Publish a freshly written table at the front of the newest-first list.
    pub fn register(&mut self, table: Arc<SstableReader>) {
        self.next_generation = self.next_generation.max(table.generation() + 1);
        self.tables.insert(0, table);
    }

    /// Overlay lookup: first table (newest→oldest) with an answer wins.
    pub fn get(&self, key: &[u8]) -> Lookup {
        for table in &self.tables {
            match table.get(key) {
                Lookup::Miss => continue,
                found => return found,
            }
        }
        Lookup::Miss
    }

    /// Stable newest-first ordering used by the engine overlay read.
    pub fn list_newest_first(&self) -> &[Arc<SstableReader>] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Rename an unusable table out of the discovery namespace so the engine
/// can still start; the bytes are preserved for forensics.
fn quarantine(path: &Path, cause: &Error) {
    let mut target = path.as_os_str().to_os_string();
    target.push(".");
    target.push(QUARANTINE_SUFFIX);

    match std::fs::rename(path, &target) {
        Ok(()) => warn!(
            path = %path.display(),
            quarantined_as = %PathBuf::from(&target).display(),
            "quarantined unreadable SSTable: {cause}"
        ),
        Err(e) => warn!(
            path = %path.display(),
            "failed to quarantine unreadable SSTable ({cause}): {e}"
        ),
    }
}
