//! Access layer for record-oriented heap files.
//!
//! This module provides the heap file abstraction over the storage layer:
//!
//! - **HeapFile**: Open handle to a page-chained file of variable-length
//!   records, with direct lookup by RecordId
//! - **HeapScan**: Sequential scan with optional predicate filtering,
//!   mark/reset checkpointing and cursor-relative delete
//! - **HeapInserter**: Append cursor that grows the page chain on overflow
//! - **ScanPredicate**: Typed comparison over a byte range of each record
//! - **FileHeader**: Per-file metadata kept in slot 0 of page 0
//!
//! The access layer owns all pin management: handles pin the header page
//! for their lifetime and move a single data-page pin along the chain as
//! records are read, filtered or appended.

pub mod error;
pub mod header;
pub mod heap;
pub mod insert;
pub mod predicate;
pub mod record;
pub mod scan;

pub use error::{AccessError, AccessResult};
pub use header::FileHeader;
pub use heap::{create_heap_file, destroy_heap_file, HeapFile};
pub use insert::HeapInserter;
pub use predicate::{AttrType, CompOp, ScanPredicate};
pub use record::{Record, RecordId};
pub use scan::HeapScan;
