//! # WAL Tests
//!
//! Covers:
//! - Record codec round-trip and corruption detection
//! - Append durability and replay ordering
//! - Truncated-tail tolerance vs mid-log corruption
//! - Rotation and close semantics

use std::fs::OpenOptions;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;

use kura_core::error::Error;
use kura_storage::wal::{Operation, Record, Wal, HEADER_SIZE};

const MAX_RECORD: usize = 1024 * 1024;

fn open_wal(path: &Path) -> Wal {
    Wal::open(path, Duration::from_millis(100), MAX_RECORD).unwrap()
}

fn collect(wal: &Wal) -> Vec<Record> {
    let mut records = Vec::new();
    wal.replay(|r| {
        records.push(r);
        Ok(())
    })
    .unwrap();
    records
}

fn set(key: &str, value: &str) -> Record {
    Record::set(Bytes::from(key.to_string()), Bytes::from(value.to_string()))
}

fn truncate_file(path: &Path, len: u64) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(len).unwrap();
}

fn flip_byte(path: &Path, offset: usize) {
    let mut data = std::fs::read(path).unwrap();
    data[offset] ^= 0xFF;
    std::fs::write(path, data).unwrap();
}

// =============================================================================
// Record codec
// =============================================================================

#[test]
fn test_record_roundtrip() {
    let record = set("key", "value");
    let encoded = record.encode();
    assert_eq!(encoded.len(), record.encoded_len());

    let decoded = Record::decode(&encoded).unwrap();
    assert_eq!(decoded, record);

    let tombstone = Record::delete(Bytes::from_static(b"gone"));
    let decoded = Record::decode(&tombstone.encode()).unwrap();
    assert_eq!(decoded.op, Operation::Delete);
    assert_eq!(decoded.key.as_ref(), b"gone");
    assert!(decoded.value.is_empty());
}

#[test]
fn test_record_roundtrip_empty_key_and_value() {
    let record = Record::set(Bytes::new(), Bytes::new());
    let decoded = Record::decode(&record.encode()).unwrap();
    assert_eq!(decoded, record);
}

#[test]
fn test_record_corrupting_any_byte_fails_decode() {
    let encoded = set("k", "v").encode();
    for offset in 0..encoded.len() {
        let mut corrupted = encoded.clone();
        corrupted[offset] ^= 0xFF;
        assert!(
            Record::decode(&corrupted).is_err(),
            "flipping byte {offset} went undetected"
        );
    }
}

#[test]
fn test_record_unknown_op_rejected() {
    let mut encoded = set("k", "v").encode();
    // Patch the op byte and re-stamp the checksum so only the op is wrong.
    encoded[HEADER_SIZE] = 0x03;
    let checksum = crc32fast::hash(&encoded[HEADER_SIZE..]);
    encoded[4..8].copy_from_slice(&checksum.to_be_bytes());

    let err = Record::decode(&encoded).unwrap_err();
    assert!(matches!(err, Error::Corruption { .. }));
}

#[test]
fn test_record_truncated_entry_rejected() {
    let encoded = set("key", "value").encode();
    assert!(Record::decode(&encoded[..encoded.len() - 1]).is_err());
    assert!(Record::decode(&encoded[..4]).is_err());
}

// =============================================================================
// Append + replay
// =============================================================================

#[tokio::test]
async fn test_append_replay_roundtrip() {
    let dir = TempDir::new().unwrap();
    let wal = open_wal(&dir.path().join("wal.log"));

    let records = vec![
        set("a", "1"),
        Record::delete(Bytes::from_static(b"a")),
        set("b", "2"),
    ];
    for record in &records {
        wal.append(record).unwrap();
    }

    assert_eq!(collect(&wal), records);
}

#[tokio::test]
async fn test_replay_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let wal = open_wal(&dir.path().join("wal.log"));
    wal.close().unwrap();
    std::fs::remove_file(dir.path().join("wal.log")).unwrap();

    assert!(collect(&wal).is_empty());
}

#[tokio::test]
async fn test_replay_survives_process_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wal.log");

    {
        let wal = open_wal(&path);
        wal.append(&set("k", "v")).unwrap();
        wal.close().unwrap();
    }

    let wal = open_wal(&path);
    let records = collect(&wal);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key.as_ref(), b"k");
}

#[tokio::test]
async fn test_record_too_large_rejected() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path().join("wal.log"), Duration::from_millis(100), 64).unwrap();

    let err = wal
        .append(&set("key", &"x".repeat(200)))
        .unwrap_err();
    assert!(matches!(err, Error::RecordTooLarge { .. }));

    // Nothing was written.
    assert!(collect(&wal).is_empty());
}

// =============================================================================
// Tail truncation vs mid-log corruption
// =============================================================================

#[tokio::test]
async fn test_truncated_tail_yields_valid_prefix() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wal.log");

    let wal = open_wal(&path);
    wal.append(&set("a", "1")).unwrap();
    wal.append(&set("b", "2")).unwrap();
    let last = set("c", "3");
    wal.append(&last).unwrap();
    wal.close().unwrap();

    let full_len = std::fs::metadata(&path).unwrap().len();

    // Cutting anywhere inside the final record leaves exactly the first two.
    for cut in 1..last.encoded_len() as u64 {
        truncate_file(&path, full_len - cut);
        let records = collect(&wal);
        assert_eq!(records.len(), 2, "cut of {cut} bytes broke the prefix");
        assert_eq!(records[0].key.as_ref(), b"a");
        assert_eq!(records[1].key.as_ref(), b"b");

        // Restore for the next iteration.
        std::fs::write(&path, {
            let mut all = Vec::new();
            all.extend_from_slice(&set("a", "1").encode());
            all.extend_from_slice(&set("b", "2").encode());
            all.extend_from_slice(&last.encode());
            all
        })
        .unwrap();
    }
}

#[tokio::test]
async fn test_corrupt_final_record_is_swallowed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wal.log");

    let wal = open_wal(&path);
    wal.append(&set("a", "1")).unwrap();
    let last = set("b", "2");
    wal.append(&last).unwrap();
    wal.close().unwrap();

    // Flip a payload byte of the final record: CRC fails at the tail.
    let full_len = std::fs::metadata(&path).unwrap().len() as usize;
    flip_byte(&path, full_len - 1);

    let records = collect(&wal);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key.as_ref(), b"a");
}

#[tokio::test]
async fn test_mid_log_corruption_fails_replay() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wal.log");

    let wal = open_wal(&path);
    let first = set("a", "1");
    wal.append(&first).unwrap();
    wal.append(&set("b", "2")).unwrap();
    wal.close().unwrap();

    // Flip a payload byte of the *first* record: valid data follows it, so
    // replay must refuse rather than silently drop acknowledged writes.
    flip_byte(&path, HEADER_SIZE + 2);

    let err = wal.replay(|_| Ok(())).unwrap_err();
    assert!(matches!(err, Error::Corruption { .. }));
}

// =============================================================================
// Rotation + close
// =============================================================================

#[tokio::test]
async fn test_rotate_empties_log() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wal.log");

    let wal = open_wal(&path);
    wal.append(&set("a", "1")).unwrap();
    wal.append(&set("b", "2")).unwrap();

    wal.rotate().unwrap();
    assert!(collect(&wal).is_empty());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

    // The rotated log accepts new appends.
    wal.append(&set("c", "3")).unwrap();
    let records = collect(&wal);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key.as_ref(), b"c");
}

#[tokio::test]
async fn test_close_is_idempotent_and_rejects_appends() {
    let dir = TempDir::new().unwrap();
    let wal = open_wal(&dir.path().join("wal.log"));

    wal.append(&set("a", "1")).unwrap();
    wal.close().unwrap();
    wal.close().unwrap();

    let err = wal.append(&set("b", "2")).unwrap_err();
    assert!(matches!(err, Error::NotReady { .. }));

    // Sync on a closed log is a no-op, not an error.
    wal.sync().unwrap();
}
