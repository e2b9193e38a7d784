//! SSTable reader: memory-mapped point lookups.

use std::fs::File;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use memmap2::Mmap;

use kura_core::error::{Error, Result};
use kura_core::types::Lookup;

use crate::sstable::{FOOTER_SIZE, OP_DELETE, OP_SET, RECORD_FIXED, SSTABLE_MAGIC};

/// An open, validated table. The whole body is verified against the footer
/// checksum at open time and the per-record index is built in the same pass,
/// so lookups afterwards are infallible.
pub struct SstableReader {
    path: PathBuf,
    generation: u64,
    mmap: Mmap,
    /// Key → record offset, in key order (file order).
    index: Vec<(Bytes, usize)>,
}

impl SstableReader {
    /// Open and validate a table file.
    pub fn open(path: impl AsRef<Path>, generation: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| Error::io(format!("opening SSTable {}", path.display()), e))?;

        let mmap = unsafe {
            Mmap::map(&file)
                .map_err(|e| Error::io(format!("mapping SSTable {}", path.display()), e))?
        };

        if mmap.len() < FOOTER_SIZE {
            return Err(Error::corruption(format!(
                "{}: file too small for footer ({} bytes)",
                path.display(),
                mmap.len()
            )));
        }

        let body_len = mmap.len() - FOOTER_SIZE;
        let footer = &mmap[body_len..];
        let entry_count = BigEndian::read_u32(&footer[0..4]) as usize;
        let checksum = BigEndian::read_u32(&footer[4..8]);

        if &footer[8..] != SSTABLE_MAGIC {
            return Err(Error::corruption(format!(
                "{}: bad magic in footer",
                path.display()
            )));
        }
        if crc32fast::hash(&mmap[..body_len]) != checksum {
            return Err(Error::corruption(format!(
                "{}: body checksum mismatch",
                path.display()
            )));
        }

        let index = build_index(&mmap[..body_len], entry_count, &path)?;

        Ok(Self {
            path,
            generation,
            mmap,
            index,
        })
    }

    /// Single-table point lookup.
    pub fn get(&self, key: &[u8]) -> Lookup {
        let Ok(pos) = self.index.binary_search_by(|(k, _)| k.as_ref().cmp(key)) else {
            return Lookup::Miss;
        };

        let offset = self.index[pos].1;
        let record = &self.mmap[offset..];
        let key_len = BigEndian::read_u32(&record[0..4]) as usize;
        let value_len = BigEndian::read_u32(&record[4..8]) as usize;

        match record[8] {
            OP_DELETE => Lookup::Tombstone,
            _ => {
                let start = RECORD_FIXED + key_len;
                Lookup::Hit(Bytes::copy_from_slice(&record[start..start + value_len]))
            }
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Walk the body once, checking record structure and collecting offsets.
fn build_index(body: &[u8], entry_count: usize, path: &Path) -> Result<Vec<(Bytes, usize)>> {
    let mut index = Vec::with_capacity(entry_count);
    let mut offset = 0usize;

    for i in 0..entry_count {
        if body.len() - offset < RECORD_FIXED {
            return Err(Error::corruption(format!(
                "{}: record {i} header out of bounds",
                path.display()
            )));
        }

        let key_len = BigEndian::read_u32(&body[offset..offset + 4]) as usize;
        let value_len = BigEndian::read_u32(&body[offset + 4..offset + 8]) as usize;
        let op = body[offset + 8];
        let record_len = RECORD_FIXED + key_len + value_len;

        if body.len() - offset < record_len {
            return Err(Error::corruption(format!(
                "{}: record {i} body out of bounds",
                path.display()
            )));
        }
        if op != OP_SET && op != OP_DELETE {
            return Err(Error::corruption(format!(
                "{}: record {i} has unknown op 0x{op:02x}",
                path.display()
            )));
        }

        let key_start = offset + RECORD_FIXED;
        let key = Bytes::copy_from_slice(&body[key_start..key_start + key_len]);
        index.push((key, offset));
        offset += record_len;
    }

    if offset != body.len() {
        return Err(Error::corruption(format!(
            "{}: {} trailing bytes after last record",
            path.display(),
            body.len() - offset
        )));
    }

    Ok(index)
}
