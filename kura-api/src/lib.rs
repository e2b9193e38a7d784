//! # KuraDB API
//!
//! The RPC surface of a shard, the deterministic shard router, and the
//! cluster-aware client.
//!
//! A shard exposes three unary operations (`Set`, `Get`, `Delete`) over
//! HTTP/JSON. Errors travel in-band (`success = false` plus a message); the
//! transport status stays OK. Clients hash keys with 32-bit FNV-1a modulo
//! the shard count and dial exactly one shard; shards never re-route.

pub mod client;
pub mod routing;
pub mod server;

pub use client::ClusterClient;
pub use routing::ShardMap;
pub use server::{create_metrics_router, create_router, AppState};
