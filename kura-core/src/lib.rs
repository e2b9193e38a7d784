//! # KuraDB Core
//!
//! This crate provides the fundamental building blocks for KuraDB:
//! - Core data types shared across the workspace
//! - Error types
//! - Configuration loading (YAML + environment overrides)
//! - Metrics collection and Prometheus exposition
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   kura-core                     │
//! ├─────────────────────────────────────────────────┤
//! │  • types      - Keys, values, lookup results    │
//! │  • traits     - Key-value store interface       │
//! │  • error      - Error handling                  │
//! │  • config     - Node + cluster configuration    │
//! │  • metrics    - Counters & latency histograms   │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::{Key, Lookup, Value};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
