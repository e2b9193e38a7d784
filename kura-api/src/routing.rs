//! Deterministic key → shard routing.
//!
//! A key always resolves to the same shard for a given cluster: the router
//! is a pure function of the key bytes and the shard list. Shards serve
//! only the keys routed to them and never re-route.

use kura_core::config::{Cluster, ShardDescriptor};
use kura_core::error::{Error, Result};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a. The constants are part of the wire contract: every client
/// must hash identically or keys land on the wrong shard.
pub fn fnv1a_32(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Stateless hash-based dispatcher over the cluster topology.
#[derive(Debug, Clone)]
pub struct ShardMap {
    shards: Vec<ShardDescriptor>,
}

impl ShardMap {
    pub fn new(shards: Vec<ShardDescriptor>) -> Result<Self> {
        if shards.is_empty() {
            return Err(Error::Configuration {
                detail: "shard map must contain at least one shard".to_string(),
            });
        }
        Ok(Self { shards })
    }

    pub fn from_cluster(cluster: &Cluster) -> Result<Self> {
        Self::new(cluster.shards.clone())
    }

    /// Map a key to the shard that owns it.
    pub fn resolve(&self, key: &[u8]) -> &ShardDescriptor {
        let index = fnv1a_32(key) as usize % self.shards.len();
        &self.shards[index]
    }

    pub fn shards(&self) -> &[ShardDescriptor] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}
