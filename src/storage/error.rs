//! Storage layer error types.

use crate::storage::disk::FileId;
use crate::storage::page::{PageId, SlotId};
use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File is still open: {0}")]
    FileInUse(String),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("No open file with id {0}")]
    UnknownFile(FileId),

    #[error("Page {page} does not exist in file {file}")]
    PageNotFound { file: FileId, page: PageId },

    #[error("Buffer pool is full: cannot allocate new frame")]
    BufferPoolFull,

    #[error("Record not found: slot {slot} is empty or deleted")]
    RecordNotFound { slot: SlotId },

    #[error("Page is full: requires {required} bytes but only {available} available")]
    PageFull { required: usize, available: usize },

    #[error("Record length mismatch: slot holds {expected} bytes, got {got}")]
    RecordSizeMismatch { expected: usize, got: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
