//! # Error Handling
//!
//! Error types shared by every KuraDB component.
//!
//! ## Design Principles
//!
//! 1. **Contextual**: Errors include relevant context (file paths, sizes)
//! 2. **Layered**: Storage errors are distinguished from configuration and
//!    lifecycle errors so callers can react differently
//! 3. **Recoverable**: Distinguish between fatal and recoverable errors

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for KuraDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for KuraDB
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying filesystem failure.
    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Checksum mismatch, length inconsistency or unrecognized op type
    /// detected anywhere other than the WAL tail.
    #[error("corruption detected: {detail}")]
    Corruption { detail: String },

    /// Operation issued while the engine is not accepting it.
    #[error("engine not ready (state: {state})")]
    NotReady { state: String },

    /// Another process already owns the data directory.
    #[error("data directory locked by another process: {path}")]
    Conflict { path: PathBuf },

    /// Internal inconsistency that should never occur.
    #[error("invariant violated: {detail}")]
    Invariant { detail: String },

    /// A key/value pair exceeds the configured record size limit.
    #[error("record too large: {size} bytes exceeds limit of {limit}")]
    RecordTooLarge { size: usize, limit: usize },

    /// Configuration file missing, unreadable or malformed.
    #[error("configuration error: {detail}")]
    Configuration { detail: String },

    /// Failure talking to a remote shard.
    #[error("rpc error: {detail}")]
    Rpc { detail: String },
}

impl Error {
    /// Attach filesystem context to an `io::Error`.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub fn corruption(detail: impl Into<String>) -> Self {
        Error::Corruption {
            detail: detail.into(),
        }
    }

    /// Check if the error leaves the process in a usable state.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Io { .. } => false,
            Error::Corruption { .. } => false,
            Error::Invariant { .. } => false,
            Error::NotReady { .. } => true,
            Error::Conflict { .. } => true,
            Error::RecordTooLarge { .. } => true,
            Error::Configuration { .. } => true,
            Error::Rpc { .. } => true,
        }
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Io { .. } => "IO_ERROR",
            Error::Corruption { .. } => "CORRUPTION",
            Error::NotReady { .. } => "NOT_READY",
            Error::Conflict { .. } => "CONFLICT",
            Error::Invariant { .. } => "INVARIANT",
            Error::RecordTooLarge { .. } => "RECORD_TOO_LARGE",
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::Rpc { .. } => "RPC_ERROR",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            context: "filesystem operation failed".to_string(),
            source: err,
        }
    }
}
