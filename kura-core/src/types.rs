//! Core data types shared across the workspace.

use bytes::Bytes;

/// Keys are arbitrary byte sequences; empty keys are legal and distinct
/// from absence.
pub type Key = Bytes;

/// Values are arbitrary byte sequences; empty values are legal and distinct
/// from absence.
pub type Value = Bytes;

/// Result of a point lookup against a single layer of the store
/// (memtable or one SSTable).
///
/// `Tombstone` is a positive answer: the key was deleted at this layer and
/// any older value beneath it must be masked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(Value),
    Tombstone,
    Miss,
}

impl Lookup {
    /// Collapse to the externally observable result: a tombstone reads as
    /// "not found".
    pub fn into_option(self) -> Option<Value> {
        match self {
            Lookup::Hit(v) => Some(v),
            Lookup::Tombstone | Lookup::Miss => None,
        }
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Lookup::Miss)
    }
}
