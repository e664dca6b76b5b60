//! Access layer error types.

use crate::storage::error::StorageError;
use thiserror::Error;

/// Errors that can occur in the heap file access layer.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Record of {size} bytes exceeds the per-record limit of {max}")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Invalid scan parameters: {0}")]
    InvalidScanParameters(String),

    #[error("Scan is not positioned on a record")]
    NoCurrentRecord,

    #[error("Heap file is corrupt: {0}")]
    Corrupt(String),

    #[error("Failed to encode or decode file header: {0}")]
    HeaderCodec(#[from] bincode::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for access layer operations.
pub type AccessResult<T> = Result<T, AccessError>;
