//! Immutable on-disk sorted tables.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  SSTable File Structure                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Record 1: [key_len u32][value_len u32][op u8][key][value]  │
//! │  Record 2: ...            (key-sorted, big-endian lengths)  │
//! │  ...                                                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Footer:   [entry_count u32][crc32(body) u32][magic 8B]     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each file is one flushed memtable snapshot, named by a zero-padded
//! monotonic generation (`sstable-0000000042.sst`) so directory order
//! recovers newest-first after a restart. Tombstones are encoded with
//! op `0x02` and a zero value length. The footer checksum detects torn
//! writes; a file failing validation at startup is quarantined, not
//! deleted.

mod reader;
mod store;
mod writer;

pub use reader::SstableReader;
pub use store::SstableStore;
pub use writer::SstableWriter;

/// Identifies a well-formed table file.
pub const SSTABLE_MAGIC: &[u8; 8] = b"KURASST1";

/// `[entry_count][body_crc][magic]`
pub const FOOTER_SIZE: usize = 16;

/// `[key_len][value_len][op]` preceding the key and value bytes.
pub const RECORD_FIXED: usize = 9;

/// Op byte for a live value.
pub(crate) const OP_SET: u8 = 0x01;
/// Op byte for a tombstone; the value length is always zero.
pub(crate) const OP_DELETE: u8 = 0x02;

const FILE_PREFIX: &str = "sstable-";
const FILE_SUFFIX: &str = ".sst";
const QUARANTINE_SUFFIX: &str = "quarantined";

/// On-disk name for a generation.
pub fn file_name(generation: u64) -> String {
    format!("{FILE_PREFIX}{generation:010}{FILE_SUFFIX}")
}

/// Parse the generation out of an SSTable file name, if it is one.
pub fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}
