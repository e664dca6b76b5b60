//! Storage layer: files, pages and the buffer pool.
//!
//! This module provides the foundation for persistent record storage using a
//! page-based architecture. Key components:
//!
//! - **FileManager**: Creates, opens and destroys page files in a data
//!   directory, and moves fixed-size (8KB) pages between disk and memory
//! - **BufferPoolManager**: In-memory cache of pages with LRU eviction and
//!   pin-based lifetime control
//! - **HeapPage**: Slotted page format for variable-length records, with a
//!   next-page link for chaining pages into a file
//!
//! Higher layers never touch the disk directly; they pin pages through the
//! buffer pool and work on the returned guards.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod page;

pub use buffer::{BufferPoolManager, PageGuard};
pub use disk::{FileId, FileManager, PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use page::{HeapPage, PageId, SlotId};
