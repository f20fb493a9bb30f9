//! Error types for feed cache operations

use thiserror::Error;

/// Storage medium errors: the bytes could not be read, written, or removed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("I/O failed during {operation}: {reason}")]
    Io { operation: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Store operation was abandoned before completing")]
    Abandoned,

    #[error("Serial lane unavailable: {reason}")]
    LaneUnavailable { reason: String },
}

impl StorageError {
    /// Build an I/O error tagged with the operation that failed.
    pub fn io(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }
}

/// Persisted bytes that do not conform to the expected schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Malformed cache document: {reason}")]
    Malformed { reason: String },

    #[error("Corrupt record graph: {reason}")]
    CorruptGraph { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown store backend: {backend}")]
    UnknownBackend { backend: String },
}

/// Master error type for all feed operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Remote loader error: {reason}")]
    Remote { reason: String },
}

impl FeedError {
    /// Returns true for failures of the underlying medium.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true for persisted documents that failed to decode.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Result type alias for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;

// =============================================================================
// TESTS
// =============================================================================
