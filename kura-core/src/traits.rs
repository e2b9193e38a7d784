//! # Core Traits
//!
//! The seam between the RPC layer and the storage engine.

use async_trait::async_trait;

use crate::{Key, Result, Value};

/// Key-value store interface implemented by the per-shard storage engine.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Durably store `value` under `key`, replacing any prior mapping.
    async fn put(&self, key: Key, value: Value) -> Result<()>;

    /// Return the freshest surviving value for `key`, if any.
    async fn get(&self, key: &[u8]) -> Result<Option<Value>>;

    /// Durably delete `key`; subsequent reads observe "not found".
    async fn delete(&self, key: Key) -> Result<()>;

    /// Force the current memtable out to an SSTable.
    async fn flush(&self) -> Result<()>;

    /// Flush pending state and release all resources; idempotent.
    async fn close(&self) -> Result<()>;
}
