//! # KuraDB Storage Engine
//!
//! The per-shard, crash-safe storage engine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Storage Engine                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  Write Path:                                                │
//! │  ┌──────────┐   append+fsync   ┌─────┐   apply   ┌────────┐ │
//! │  │ Mutation │─────────────────>│ WAL │──────────>│Memtable│ │
//! │  └──────────┘                  └─────┘           └───┬────┘ │
//! │                                                      │flush │
//! │                                                      ▼      │
//! │                                                 ┌─────────┐ │
//! │                                                 │ SSTable │ │
//! │                                                 └─────────┘ │
//! │                                                             │
//! │  Read Path: memtable → SSTables newest-first                │
//! │  Recovery:  replay WAL into an empty memtable               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each shard owns exactly one [`Engine`]; a lockfile in the data directory
//! rejects accidental double-open.

pub mod cdc;
pub mod engine;
pub mod lockfile;
pub mod memtable;
pub mod sstable;
pub mod wal;

pub use cdc::{CdcPublisher, CdcSink, ChangeEvent, LogSink};
pub use engine::{Engine, EngineConfig, EngineState};
pub use memtable::{Entry, Memtable};
pub use sstable::{SstableReader, SstableStore};
pub use wal::{Operation, Record, Wal};
