//! WAL record wire format.
//!
//! ```text
//! ┌────────────────┬──────────────┬────┬─────────┬───────────┬─────┬───────┐
//! │ payload_len u32│ crc32 u32    │ op │ key_len │ value_len │ key │ value │
//! │ (big-endian)   │ (of payload) │ u8 │ u32 BE  │ u32 BE    │     │       │
//! └────────────────┴──────────────┴────┴─────────┴───────────┴─────┴───────┘
//! ```
//!
//! The 8-byte header covers a payload of `9 + key_len + value_len` bytes;
//! `payload_len` must equal that sum or the record is corrupt.

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use kura_core::error::{Error, Result};

/// Bytes of `[payload_len][checksum]` preceding every payload.
pub const HEADER_SIZE: usize = 8;

/// Fixed payload prefix: op byte + key length + value length.
pub const PAYLOAD_FIXED: usize = 9;

const OP_SET: u8 = 0x01;
const OP_DELETE: u8 = 0x02;

/// Mutation kind carried by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    Set = OP_SET,
    Delete = OP_DELETE,
}

impl Operation {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Operation {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            OP_SET => Ok(Operation::Set),
            OP_DELETE => Ok(Operation::Delete),
            other => Err(Error::corruption(format!("unknown op type 0x{other:02x}"))),
        }
    }
}

/// One durable mutation: a set or a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub op: Operation,
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn set(key: Bytes, value: Bytes) -> Self {
        Self {
            op: Operation::Set,
            key,
            value,
        }
    }

    /// Deletes carry no value; `value_len` is encoded as zero.
    pub fn delete(key: Bytes) -> Self {
        Self {
            op: Operation::Delete,
            key,
            value: Bytes::new(),
        }
    }

    /// Total on-disk size of the encoded record.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + PAYLOAD_FIXED + self.key.len() + self.value.len()
    }

    /// Serialize to `[header][payload]`.
    pub fn encode(&self) -> Vec<u8> {
        let payload_len = PAYLOAD_FIXED + self.key.len() + self.value.len();
        let mut buf = vec![0u8; HEADER_SIZE + payload_len];

        {
            let payload = &mut buf[HEADER_SIZE..];
            payload[0] = self.op.as_byte();
            BigEndian::write_u32(&mut payload[1..5], self.key.len() as u32);
            BigEndian::write_u32(&mut payload[5..9], self.value.len() as u32);
            payload[PAYLOAD_FIXED..PAYLOAD_FIXED + self.key.len()].copy_from_slice(&self.key);
            payload[PAYLOAD_FIXED + self.key.len()..].copy_from_slice(&self.value);
        }

        let checksum = crc32fast::hash(&buf[HEADER_SIZE..]);
        BigEndian::write_u32(&mut buf[0..4], (payload_len) as u32);
        BigEndian::write_u32(&mut buf[4..8], checksum);
        buf
    }

    /// Deserialize a full `[header][payload]` entry, validating length,
    /// checksum and payload structure.
    pub fn decode(entry: &[u8]) -> Result<Self> {
        if entry.len() < HEADER_SIZE + PAYLOAD_FIXED {
            return Err(Error::corruption(format!(
                "record too short: {} bytes",
                entry.len()
            )));
        }

        let payload_len = BigEndian::read_u32(&entry[0..4]) as usize;
        let checksum = BigEndian::read_u32(&entry[4..8]);
        let payload = &entry[HEADER_SIZE..];

        if payload.len() != payload_len {
            return Err(Error::corruption(format!(
                "record length mismatch: header says {payload_len}, got {}",
                payload.len()
            )));
        }

        Self::decode_payload(payload, checksum)
    }

    /// Deserialize a payload whose header has already been consumed.
    pub(crate) fn decode_payload(payload: &[u8], checksum: u32) -> Result<Self> {
        if payload.len() < PAYLOAD_FIXED {
            return Err(Error::corruption(format!(
                "payload too short: {} bytes",
                payload.len()
            )));
        }

        if crc32fast::hash(payload) != checksum {
            return Err(Error::corruption("checksum mismatch"));
        }

        let op = Operation::try_from(payload[0])?;
        let key_len = BigEndian::read_u32(&payload[1..5]) as usize;
        let value_len = BigEndian::read_u32(&payload[5..9]) as usize;

        if PAYLOAD_FIXED + key_len + value_len != payload.len() {
            return Err(Error::corruption(format!(
                "payload lengths inconsistent: key {key_len} + value {value_len} != {}",
                payload.len() - PAYLOAD_FIXED
            )));
        }

        let key = Bytes::copy_from_slice(&payload[PAYLOAD_FIXED..PAYLOAD_FIXED + key_len]);
        let value = Bytes::copy_from_slice(&payload[PAYLOAD_FIXED + key_len..]);

        Ok(Self { op, key, value })
    }
}
