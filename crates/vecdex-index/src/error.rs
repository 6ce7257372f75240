//! Index manager error types.

use thiserror::Error;

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Caller input has the wrong shape or type
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Zero-copy buffer does not start on an element boundary
    #[error("Memory alignment error: {element} buffer at offset {byte_offset} is not {align}-byte aligned")]
    Alignment {
        element: &'static str,
        byte_offset: usize,
        align: usize,
    },

    /// Vector length does not match the index dimensions
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Keys and vectors of a batch disagree in count
    #[error("Batch mismatch: {keys} keys for {vectors} vector components with {dimensions} dimensions")]
    BatchSizeMismatch {
        keys: usize,
        vectors: usize,
        dimensions: usize,
    },

    /// Path rejected by the traversal guard
    #[error("Security violation: path traversal is not allowed: {0}")]
    SecurityViolation(String),

    /// A background batch job is already running
    #[error("Index is already busy with a batch job")]
    Busy,

    /// The index has been released
    #[error("Index has been released")]
    Released,

    /// Failure reported by the ANN engine
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Save or load failed
    #[error("Persistence error for '{path}': {message}")]
    Persistence { path: String, message: String },

    /// Raw vector file size is not a whole number of records
    #[error("Malformed vector file '{path}': {len} bytes is not a positive multiple of {record_len}-byte records")]
    MalformedFile {
        path: String,
        len: u64,
        record_len: usize,
    },

    /// Deferred failure of the last background batch job
    #[error("Batch job failed: {0}")]
    BatchFailed(String),

    /// Index lock was poisoned by a panicking holder
    #[error("Index lock poisoned")]
    LockPoisoned,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure message reported by an `AnnEngine`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
