//! Error types for oxbow storage operations.

use thiserror::Error;

/// Result type alias using [`OxbowError`].
pub type Result<T> = std::result::Result<T, OxbowError>;

/// Error types for oxbow storage operations.
///
/// Capacity exhaustion, not-found and already-exists conditions are reported
/// as `Option`/`bool` results by the buffer pool and hash table; this enum
/// covers the failures that carry context, mostly from the disk layer.
#[derive(Debug, Error)]
pub enum OxbowError {
    /// General storage/I/O error.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Buffer pool errors (bad configuration, exhausted pool).
    #[error("Buffer pool error: {0}")]
    BufferPoolError(String),
}
