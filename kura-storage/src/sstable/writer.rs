//! SSTable writer: streams one memtable snapshot to disk.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, WriteBytesExt};
use tracing::info;

use kura_core::error::{Error, Result};

use crate::memtable::Entry;
use crate::sstable::{OP_DELETE, OP_SET, RECORD_FIXED, SSTABLE_MAGIC};

/// Writes records in the order they are added; the caller must feed them
/// key-sorted (the memtable's `iter_sorted` already is).
pub struct SstableWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    hasher: crc32fast::Hasher,
    entry_count: u32,
    body_bytes: u64,
}

impl SstableWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::io(format!("creating SSTable {}", path.display()), e))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            hasher: crc32fast::Hasher::new(),
            entry_count: 0,
            body_bytes: 0,
        })
    }

    /// Append one record to the body.
    pub fn add(&mut self, key: &[u8], entry: &Entry) -> Result<()> {
        let (op, value): (u8, &[u8]) = match entry {
            Entry::Value(v) => (OP_SET, v),
            Entry::Tombstone => (OP_DELETE, &[]),
        };

        let mut buf = Vec::with_capacity(RECORD_FIXED + key.len() + value.len());
        buf.write_u32::<BigEndian>(key.len() as u32)?;
        buf.write_u32::<BigEndian>(value.len() as u32)?;
        buf.push(op);
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);

        self.hasher.update(&buf);
        self.writer
            .write_all(&buf)
            .map_err(|e| Error::io(format!("writing SSTable {}", self.path.display()), e))?;
        self.entry_count += 1;
        self.body_bytes += buf.len() as u64;
        Ok(())
    }

    /// Write the footer, fsync, and close. Returns the entry count.
    pub fn finish(mut self) -> Result<u32> {
        let checksum = self.hasher.finalize();
        self.writer.write_u32::<BigEndian>(self.entry_count)?;
        self.writer.write_u32::<BigEndian>(checksum)?;
        self.writer.write_all(SSTABLE_MAGIC)?;

        self.writer
            .flush()
            .map_err(|e| Error::io(format!("flushing SSTable {}", self.path.display()), e))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| Error::io(format!("syncing SSTable {}", self.path.display()), e))?;

        info!(
            path = %self.path.display(),
            entries = self.entry_count,
            bytes = self.body_bytes,
            "finished writing SSTable"
        );
        Ok(self.entry_count)
    }
}
