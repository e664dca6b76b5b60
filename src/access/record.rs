use crate::storage::page::{PageId, SlotId};
use std::fmt;

/// Unique identifier for a record: (page_id, slot_id).
///
/// Ids order by page first, then slot, which is the order a sequential scan
/// visits records in. An id stays valid for the life of the record; deleting
/// other records on the page never renumbers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.page_id.0, self.slot_id).cmp(&(other.page_id.0, other.slot_id))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot_id)
    }
}

/// A record with its identifier and a copy of its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub rid: RecordId,
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(rid: RecordId, data: Vec<u8>) -> Self {
        Self { rid, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
