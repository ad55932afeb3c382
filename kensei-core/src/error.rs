//! # Error Handling
//!
//! Error types shared by every Kensei crate.
//!
//! ## Design Principles
//!
//! 1. **Eager**: configuration problems are detected before any work begins
//! 2. **Contextual**: errors carry the values that caused them
//! 3. **Scoped**: per-item failures (unknown ids, duplicates) are aggregated
//!    into batch outcomes and never abort the batch; only structural problems
//!    (dimension mismatch, bad configuration) fail a whole call

use thiserror::Error;

/// Result type alias for Kensei operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for Kensei
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid parameter combination, detected before any work begins.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Query or insert vector dimensionality disagrees with the index.
    /// Fails the whole call.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// An operation referenced an external id that is not in the index.
    /// Per-item; batch operations aggregate these instead of propagating.
    #[error("Unknown external id: {id}")]
    UnknownId { id: u64 },

    /// A snapshot failed validation (bad magic, version, or contents),
    /// or an internal structural check tripped.
    #[error("Index corruption detected: {details}")]
    IndexCorruption { details: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Check if the error is recoverable by the caller
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Configuration { .. } => true,
            Error::DimensionMismatch { .. } => true,
            Error::UnknownId { .. } => true,
            Error::IndexCorruption { .. } => false,
            Error::Io { .. } => false,
            Error::Internal { .. } => false,
        }
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Error::UnknownId { .. } => "UNKNOWN_ID",
            Error::IndexCorruption { .. } => "INDEX_CORRUPTION",
            Error::Io { .. } => "IO_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}
