use crate::storage::page::PageId;
use serde::{Deserialize, Serialize};

/// File-level metadata, stored as the single record of the header page
/// (page 0) of every heap file.
///
/// The page links are raw u32 fields with 0 meaning "none"; page 0 is the
/// header page itself, so no data page can be a legitimate target. Keeping
/// the fields fixed-width (and the name immutable after creation) means the
/// encoded header always has the same length, so it can be rewritten in
/// place over the stored record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileHeader {
    name: String,
    first_page: u32,
    last_page: u32,
    page_count: u32,
    record_count: u32,
}

impl FileHeader {
    /// Slot of the header record on the header page.
    pub const SLOT: u16 = 0;

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            first_page: 0,
            last_page: 0,
            page_count: 0,
            record_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first_page(&self) -> Option<PageId> {
        if self.first_page == 0 {
            None
        } else {
            Some(PageId(self.first_page))
        }
    }

    pub fn set_first_page(&mut self, page_id: Option<PageId>) {
        self.first_page = page_id.map(|id| id.0).unwrap_or(0);
    }

    pub fn last_page(&self) -> Option<PageId> {
        if self.last_page == 0 {
            None
        } else {
            Some(PageId(self.last_page))
        }
    }

    pub fn set_last_page(&mut self, page_id: Option<PageId>) {
        self.last_page = page_id.map(|id| id.0).unwrap_or(0);
    }

    /// Number of data pages in the file, excluding the header page.
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn set_page_count(&mut self, count: u32) {
        self.page_count = count;
    }

    /// Number of live records in the file.
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    pub fn set_record_count(&mut self, count: u32) {
        self.record_count = count;
    }

    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
