use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{PageId, SlotId};
use crate::storage::PAGE_SIZE;

// Header structure (16 bytes)
const HEADER_SIZE: usize = 16;
const PAGE_ID_OFFSET: usize = 0;
const NEXT_PAGE_ID_OFFSET: usize = 4;
const FREE_SPACE_POINTER_OFFSET: usize = 8;
const SLOT_COUNT_OFFSET: usize = 10;

// Slot size (4 bytes: 2 for offset, 2 for length)
const SLOT_SIZE: usize = 4;

// On disk, 0 in the next-page field means "end of chain". Page 0 is always
// a file's header page, so no data page can ever be a legitimate target.
const NO_NEXT_PAGE: u32 = 0;

/// Slotted page over a pinned frame's bytes. Records grow up from the
/// header, the slot directory grows down from the page end. A deleted slot
/// keeps its directory entry (zeroed), so slot ids of live records never
/// shift.
pub struct HeapPage<'a> {
    data: &'a mut [u8; PAGE_SIZE],
}

impl<'a> HeapPage<'a> {
    /// Largest record that fits on an empty page.
    pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - HEADER_SIZE - SLOT_SIZE;

    pub fn new(data: &'a mut [u8; PAGE_SIZE], page_id: PageId) -> Self {
        data.fill(0);
        data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4].copy_from_slice(&page_id.0.to_le_bytes());
        data[NEXT_PAGE_ID_OFFSET..NEXT_PAGE_ID_OFFSET + 4]
            .copy_from_slice(&NO_NEXT_PAGE.to_le_bytes());

        // Free space starts right after the header
        let free_space_pointer = HEADER_SIZE as u16;
        data[FREE_SPACE_POINTER_OFFSET..FREE_SPACE_POINTER_OFFSET + 2]
            .copy_from_slice(&free_space_pointer.to_le_bytes());
        data[SLOT_COUNT_OFFSET..SLOT_COUNT_OFFSET + 2].copy_from_slice(&0u16.to_le_bytes());

        Self { data }
    }

    pub fn from_data(data: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        let bytes = [
            self.data[PAGE_ID_OFFSET],
            self.data[PAGE_ID_OFFSET + 1],
            self.data[PAGE_ID_OFFSET + 2],
            self.data[PAGE_ID_OFFSET + 3],
        ];
        PageId(u32::from_le_bytes(bytes))
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        let bytes = [
            self.data[NEXT_PAGE_ID_OFFSET],
            self.data[NEXT_PAGE_ID_OFFSET + 1],
            self.data[NEXT_PAGE_ID_OFFSET + 2],
            self.data[NEXT_PAGE_ID_OFFSET + 3],
        ];
        let id = u32::from_le_bytes(bytes);
        if id == NO_NEXT_PAGE {
            None
        } else {
            Some(PageId(id))
        }
    }

    pub fn set_next_page_id(&mut self, next: Option<PageId>) {
        let id = next.map(|page_id| page_id.0).unwrap_or(NO_NEXT_PAGE);
        self.data[NEXT_PAGE_ID_OFFSET..NEXT_PAGE_ID_OFFSET + 4]
            .copy_from_slice(&id.to_le_bytes());
    }

    pub fn insert_record(&mut self, record: &[u8]) -> StorageResult<SlotId> {
        let slot_count = self.get_slot_count();
        let free_space_pointer = self.get_free_space_pointer();

        let required = record.len() + SLOT_SIZE;
        let available = self.free_space();
        if available < required {
            return Err(StorageError::PageFull {
                required,
                available,
            });
        }

        // Write record data
        let record_offset = free_space_pointer;
        self.data[record_offset as usize..record_offset as usize + record.len()]
            .copy_from_slice(record);
        self.set_free_space_pointer(record_offset + record.len() as u16);

        // Add slot entry
        let slot_offset = Self::slot_offset(slot_count);
        self.data[slot_offset..slot_offset + 2].copy_from_slice(&record_offset.to_le_bytes());
        self.data[slot_offset + 2..slot_offset + 4]
            .copy_from_slice(&(record.len() as u16).to_le_bytes());

        self.set_slot_count(slot_count + 1);

        Ok(slot_count)
    }

    pub fn get_record(&self, slot_id: SlotId) -> StorageResult<&[u8]> {
        match self.slot_entry(slot_id) {
            Some((offset, length)) if Self::is_live_entry(offset, length) => {
                Ok(&self.data[offset as usize..(offset + length) as usize])
            }
            _ => Err(StorageError::RecordNotFound { slot: slot_id }),
        }
    }

    /// Overwrite a live record in place. The new bytes must have the same
    /// length as the stored record; the slot directory is not touched.
    pub fn update_record(&mut self, slot_id: SlotId, record: &[u8]) -> StorageResult<()> {
        match self.slot_entry(slot_id) {
            Some((offset, length)) if Self::is_live_entry(offset, length) => {
                if record.len() != length as usize {
                    return Err(StorageError::RecordSizeMismatch {
                        expected: length as usize,
                        got: record.len(),
                    });
                }
                self.data[offset as usize..offset as usize + record.len()]
                    .copy_from_slice(record);
                Ok(())
            }
            _ => Err(StorageError::RecordNotFound { slot: slot_id }),
        }
    }

    pub fn delete_record(&mut self, slot_id: SlotId) -> StorageResult<()> {
        match self.slot_entry(slot_id) {
            Some((offset, length)) if Self::is_live_entry(offset, length) => {
                // Mark slot as deleted (offset = 0, length = 0); the record
                // bytes stay where they are and are never reclaimed.
                let slot_offset = Self::slot_offset(slot_id);
                self.data[slot_offset..slot_offset + SLOT_SIZE].fill(0);
                Ok(())
            }
            _ => Err(StorageError::RecordNotFound { slot: slot_id }),
        }
    }

    /// Lowest live slot on the page, if any.
    pub fn first_slot(&self) -> Option<SlotId> {
        self.next_live_slot(0)
    }

    /// Lowest live slot strictly after `slot_id`. `None` means the rest of
    /// the page is exhausted.
    pub fn next_slot(&self, slot_id: SlotId) -> Option<SlotId> {
        self.next_live_slot(slot_id.checked_add(1)?)
    }

    pub fn slot_count(&self) -> u16 {
        self.get_slot_count()
    }

    pub fn free_space(&self) -> usize {
        let free_space_pointer = self.get_free_space_pointer();
        let slot_count = self.get_slot_count();
        let slot_array_start = PAGE_SIZE - (slot_count as usize * SLOT_SIZE);

        slot_array_start.saturating_sub(free_space_pointer as usize)
    }

    fn next_live_slot(&self, start: SlotId) -> Option<SlotId> {
        (start..self.get_slot_count()).find(|&slot_id| self.is_live(slot_id))
    }

    fn is_live(&self, slot_id: SlotId) -> bool {
        matches!(
            self.slot_entry(slot_id),
            Some((offset, length)) if Self::is_live_entry(offset, length)
        )
    }

    fn is_live_entry(offset: u16, length: u16) -> bool {
        offset != 0 || length != 0
    }

    fn slot_entry(&self, slot_id: SlotId) -> Option<(u16, u16)> {
        if slot_id >= self.get_slot_count() {
            return None;
        }
        let slot_offset = Self::slot_offset(slot_id);
        let offset = u16::from_le_bytes([self.data[slot_offset], self.data[slot_offset + 1]]);
        let length = u16::from_le_bytes([self.data[slot_offset + 2], self.data[slot_offset + 3]]);
        Some((offset, length))
    }

    fn slot_offset(slot_id: SlotId) -> usize {
        PAGE_SIZE - ((slot_id as usize + 1) * SLOT_SIZE)
    }

    fn get_free_space_pointer(&self) -> u16 {
        u16::from_le_bytes([
            self.data[FREE_SPACE_POINTER_OFFSET],
            self.data[FREE_SPACE_POINTER_OFFSET + 1],
        ])
    }

    fn set_free_space_pointer(&mut self, pointer: u16) {
        self.data[FREE_SPACE_POINTER_OFFSET..FREE_SPACE_POINTER_OFFSET + 2]
            .copy_from_slice(&pointer.to_le_bytes());
    }

    fn get_slot_count(&self) -> u16 {
        u16::from_le_bytes([
            self.data[SLOT_COUNT_OFFSET],
            self.data[SLOT_COUNT_OFFSET + 1],
        ])
    }

    fn set_slot_count(&mut self, count: u16) {
        self.data[SLOT_COUNT_OFFSET..SLOT_COUNT_OFFSET + 2].copy_from_slice(&count.to_le_bytes());
    }
}
