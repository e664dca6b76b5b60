//! Appending records to a heap file.

use crate::access::error::{AccessError, AccessResult};
use crate::access::heap::HeapFile;
use crate::access::record::RecordId;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::error::StorageError;
use crate::storage::page::{HeapPage, PageId};

/// Append cursor over a heap file.
///
/// Inserts always go to the chain tail; when the tail fills up, a fresh
/// page is allocated, linked in and adopted as the new tail. The underlying
/// handle pins no data page until the first insert.
pub struct HeapInserter {
    file: HeapFile,
}

impl HeapInserter {
    pub fn open(pool: BufferPoolManager, name: &str) -> AccessResult<Self> {
        Ok(Self {
            file: HeapFile::open_unpositioned(pool, name)?,
        })
    }

    pub fn name(&self) -> &str {
        self.file.name()
    }

    pub fn record_count(&mut self) -> AccessResult<u32> {
        self.file.record_count()
    }

    pub fn page_count(&mut self) -> AccessResult<u32> {
        self.file.page_count()
    }

    /// Append `data` as a new record and return its id.
    ///
    /// Fails with `RecordTooLarge` before touching any page if the record
    /// cannot fit on an empty page.
    pub fn insert_record(&mut self, data: &[u8]) -> AccessResult<RecordId> {
        if data.len() > HeapPage::MAX_RECORD_SIZE {
            return Err(AccessError::RecordTooLarge {
                size: data.len(),
                max: HeapPage::MAX_RECORD_SIZE,
            });
        }

        // Re-read the tail from the shared header: another handle may have
        // extended the chain since the last insert.
        let tail = match self.file.last_page()? {
            Some(page_id) => page_id,
            None => {
                return Err(AccessError::Corrupt(
                    "heap file has no data pages".to_string(),
                ))
            }
        };

        let rid = self.insert_at_tail(tail, data)?;

        self.file.update_header(|header| {
            header.set_record_count(header.record_count() + 1);
        })?;

        Ok(rid)
    }

    fn insert_at_tail(&mut self, tail: PageId, data: &[u8]) -> AccessResult<RecordId> {
        {
            let guard = self.file.pin_page(tail)?;
            match HeapPage::from_data(&mut *guard).insert_record(data) {
                Ok(slot_id) => {
                    guard.mark_dirty();
                    return Ok(RecordId::new(tail, slot_id));
                }
                Err(StorageError::PageFull { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        // The tail is full. Extend the chain: allocate a fresh page, link
        // the old tail to it, and make it the new current page.
        let (new_page_id, mut new_guard) = self.file.allocate_page()?;
        HeapPage::new(&mut new_guard, new_page_id);

        {
            let guard = self.file.pin_page(tail)?;
            HeapPage::from_data(&mut *guard).set_next_page_id(Some(new_page_id));
            guard.mark_dirty();
        }
        self.file.adopt_current(new_guard);

        // Retry on the empty page; a record that passed the size check
        // cannot fail again, so a second PageFull propagates as corruption
        // of the size accounting.
        let slot_id = {
            let guard = self.file.pin_page(new_page_id)?;
            HeapPage::from_data(&mut *guard).insert_record(data)?
        };

        self.file.update_header(|header| {
            header.set_last_page(Some(new_page_id));
            header.set_page_count(header.page_count() + 1);
        })?;

        Ok(RecordId::new(new_page_id, slot_id))
    }
}

impl Drop for HeapInserter {
    fn drop(&mut self) {
        // Only an insert can have left a page pinned, so flag it for
        // write-back before the handle closes the file.
        self.file.mark_current_dirty();
    }
}
