use crate::access::error::{AccessError, AccessResult};
use crate::access::header::FileHeader;
use crate::access::record::{Record, RecordId};
use crate::storage::buffer::{BufferPoolManager, PageGuard};
use crate::storage::disk::FileId;
use crate::storage::error::StorageResult;
use crate::storage::page::{HeapPage, PageId};
use log::error;

/// Create a heap file: the named file plus its header page (page 0, holding
/// the serialized [`FileHeader`] in slot 0) and one empty data page linked
/// as both first and last page of the chain.
///
/// The file is closed before returning, which flushes it, so the new file is
/// durable on success; a close failure is the operation's error. A failure
/// mid-initialization leaves the pins released and the file closed but does
/// not delete it.
pub fn create_heap_file(pool: &BufferPoolManager, name: &str) -> AccessResult<()> {
    pool.create_file(name)?;
    let file_id = pool.open_file(name)?;
    let result = init_heap_file(pool, file_id, name);
    let close_result = pool.close_file(file_id);
    match result {
        Ok(()) => {
            // The close is what flushes the new pages; without it nothing
            // is durable yet.
            close_result?;
            Ok(())
        }
        Err(init_err) => {
            if let Err(close_err) = close_result {
                error!(
                    "failed to close heap file {} after failed initialization: {}",
                    name, close_err
                );
            }
            Err(init_err)
        }
    }
}

fn init_heap_file(pool: &BufferPoolManager, file_id: FileId, name: &str) -> AccessResult<()> {
    let (header_page_id, mut header_guard) = pool.allocate_page(file_id)?;
    let mut header = FileHeader::new(name);
    {
        let mut page = HeapPage::new(&mut header_guard, header_page_id);
        page.insert_record(&header.serialize()?)?;
    }

    let (data_page_id, mut data_guard) = pool.allocate_page(file_id)?;
    HeapPage::new(&mut data_guard, data_page_id);
    drop(data_guard);

    // The encoded header keeps its length when only links and counts change,
    // so the final state overwrites slot 0 in place.
    header.set_first_page(Some(data_page_id));
    header.set_last_page(Some(data_page_id));
    header.set_page_count(1);
    let mut page = HeapPage::from_data(&mut header_guard);
    page.update_record(FileHeader::SLOT, &header.serialize()?)?;

    Ok(())
}

/// Remove a heap file from disk. Fails with `FileNotFound` if it does not
/// exist and `FileInUse` while any handle still has it open.
pub fn destroy_heap_file(pool: &BufferPoolManager, name: &str) -> AccessResult<()> {
    pool.destroy_file(name)?;
    Ok(())
}

/// Open heap file handle.
///
/// Holds the header page pinned for its whole lifetime plus at most one
/// pinned data page (the "current" page), which follows the record being
/// read, scanned or appended. Header state is decoded from the pinned
/// frame on every access rather than cached per handle: overlapping
/// handles on one file share that frame, so each sees the others' count
/// and chain-link updates. Dropping the handle closes the file; the last
/// handle to close flushes the file's dirty pages.
pub struct HeapFile {
    pool: BufferPoolManager,
    file_id: FileId,
    name: String,
    header_page: PageGuard,
    cur: Option<PageGuard>,
}

impl HeapFile {
    /// Open the file and position on its first data page.
    pub fn open(pool: BufferPoolManager, name: &str) -> AccessResult<Self> {
        Self::open_inner(pool, name, true)
    }

    /// Open the file without pinning a data page. Used by the insert
    /// cursor, which only ever pins the chain tail.
    pub fn open_unpositioned(pool: BufferPoolManager, name: &str) -> AccessResult<Self> {
        Self::open_inner(pool, name, false)
    }

    fn open_inner(pool: BufferPoolManager, name: &str, pin_first: bool) -> AccessResult<Self> {
        let file_id = pool.open_file(name)?;
        match Self::read_file(pool.clone(), file_id, pin_first) {
            Ok(file) => Ok(file),
            Err(e) => {
                if let Err(close_err) = pool.close_file(file_id) {
                    error!("failed to close {} after open error: {}", name, close_err);
                }
                Err(e)
            }
        }
    }

    fn read_file(pool: BufferPoolManager, file_id: FileId, pin_first: bool) -> AccessResult<Self> {
        let header_page_id = pool.first_page_id(file_id)?;
        let mut header_page = pool.fetch_page(file_id, header_page_id)?;
        let header = Self::decode_header(&mut header_page)?;

        let cur = match header.first_page() {
            Some(first) if pin_first => Some(pool.fetch_page(file_id, first)?),
            _ => None,
        };

        Ok(Self {
            pool,
            file_id,
            name: header.name().to_string(),
            header_page,
            cur,
        })
    }

    fn decode_header(header_page: &mut PageGuard) -> AccessResult<FileHeader> {
        let page = HeapPage::from_data(header_page);
        let bytes = page
            .get_record(FileHeader::SLOT)
            .map_err(|_| AccessError::Corrupt("header page has no header record".to_string()))?;
        Ok(FileHeader::deserialize(bytes)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of live records, decoded from the pinned header page.
    pub fn record_count(&mut self) -> AccessResult<u32> {
        Ok(Self::decode_header(&mut self.header_page)?.record_count())
    }

    /// Number of data pages, decoded from the pinned header page.
    pub fn page_count(&mut self) -> AccessResult<u32> {
        Ok(Self::decode_header(&mut self.header_page)?.page_count())
    }

    pub fn first_page(&mut self) -> AccessResult<Option<PageId>> {
        Ok(Self::decode_header(&mut self.header_page)?.first_page())
    }

    pub fn last_page(&mut self) -> AccessResult<Option<PageId>> {
        Ok(Self::decode_header(&mut self.header_page)?.last_page())
    }

    /// Read the record at `rid`, copying its bytes out of the page. Moves
    /// the current-page pin to `rid.page_id` if it is not there already.
    pub fn get_record(&mut self, rid: RecordId) -> AccessResult<Record> {
        let guard = self.pin_page(rid.page_id)?;
        let page = HeapPage::from_data(guard);
        let data = page.get_record(rid.slot_id)?;
        Ok(Record::new(rid, data.to_vec()))
    }

    /// Make `page_id` the current page. A same-page call keeps the existing
    /// pin untouched; otherwise the old pin is released before the new page
    /// is fetched.
    pub(crate) fn pin_page(&mut self, page_id: PageId) -> StorageResult<&mut PageGuard> {
        match self.cur.take() {
            Some(guard) if guard.page_id() == page_id => Ok(self.cur.insert(guard)),
            stale => {
                drop(stale);
                let guard = self.pool.fetch_page(self.file_id, page_id)?;
                Ok(self.cur.insert(guard))
            }
        }
    }

    pub(crate) fn current(&mut self) -> Option<&mut PageGuard> {
        self.cur.as_mut()
    }

    pub(crate) fn current_page_id(&self) -> Option<PageId> {
        self.cur.as_ref().map(|guard| guard.page_id())
    }

    pub(crate) fn release_current(&mut self) {
        self.cur = None;
    }

    /// Replace the current pin with an already-pinned page (the old pin, if
    /// any, is released).
    pub(crate) fn adopt_current(&mut self, guard: PageGuard) {
        self.cur = Some(guard);
    }

    pub(crate) fn mark_current_dirty(&self) {
        if let Some(guard) = &self.cur {
            guard.mark_dirty();
        }
    }

    pub(crate) fn allocate_page(&self) -> StorageResult<(PageId, PageGuard)> {
        self.pool.allocate_page(self.file_id)
    }

    /// Read-modify-write the header record through the pinned header page,
    /// marking it dirty. Decoding before the update means the closure acts
    /// on the latest counts and links even when another handle wrote them.
    pub(crate) fn update_header(
        &mut self,
        update: impl FnOnce(&mut FileHeader),
    ) -> AccessResult<()> {
        let mut header = Self::decode_header(&mut self.header_page)?;
        update(&mut header);
        let bytes = header.serialize()?;
        {
            let mut page = HeapPage::from_data(&mut self.header_page);
            page.update_record(FileHeader::SLOT, &bytes)?;
        }
        self.header_page.mark_dirty();
        Ok(())
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        // Release the data-page pin first so a last-handle close can purge
        // the file's frames; the header page stays pinned through the close
        // and is written out by its flush.
        self.cur = None;
        if let Err(e) = self.pool.close_file(self.file_id) {
            error!("failed to close heap file {}: {}", self.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::insert::HeapInserter;
    use crate::storage::buffer::lru::LruReplacer;
    use crate::storage::disk::FileManager;
    use crate::storage::error::StorageError;
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    fn create_test_pool(max_frames: usize) -> Result<(TempDir, BufferPoolManager)> {
        let dir = tempdir()?;
        let file_manager = FileManager::new(dir.path())?;
        let replacer = Box::new(LruReplacer::new(max_frames));
        let pool = BufferPoolManager::new(file_manager, replacer, max_frames);
        Ok((dir, pool))
    }

    #[test]
    fn test_create_initializes_header() -> Result<()> {
        let (_dir, pool) = create_test_pool(10)?;

        create_heap_file(&pool, "orders")?;
        let mut file = HeapFile::open(pool.clone(), "orders")?;

        assert_eq!(file.name(), "orders");
        assert_eq!(file.record_count()?, 0);
        assert_eq!(file.page_count()?, 1);
        assert_eq!(file.first_page()?, Some(PageId(1)));
        assert_eq!(file.last_page()?, Some(PageId(1)));

        Ok(())
    }

    #[test]
    fn test_create_existing_file_fails() -> Result<()> {
        let (_dir, pool) = create_test_pool(10)?;

        create_heap_file(&pool, "orders")?;
        assert!(matches!(
            create_heap_file(&pool, "orders"),
            Err(AccessError::Storage(StorageError::FileAlreadyExists(_)))
        ));

        Ok(())
    }

    #[test]
    fn test_destroy_heap_file() -> Result<()> {
        let (_dir, pool) = create_test_pool(10)?;

        create_heap_file(&pool, "orders")?;
        assert!(pool.file_exists("orders"));
        destroy_heap_file(&pool, "orders")?;
        assert!(!pool.file_exists("orders"));

        assert!(matches!(
            destroy_heap_file(&pool, "orders"),
            Err(AccessError::Storage(StorageError::FileNotFound(_)))
        ));

        Ok(())
    }

    #[test]
    fn test_destroy_open_file_fails() -> Result<()> {
        let (_dir, pool) = create_test_pool(10)?;

        create_heap_file(&pool, "orders")?;
        let file = HeapFile::open(pool.clone(), "orders")?;

        assert!(matches!(
            destroy_heap_file(&pool, "orders"),
            Err(AccessError::Storage(StorageError::FileInUse(_)))
        ));

        drop(file);
        destroy_heap_file(&pool, "orders")?;

        Ok(())
    }

    #[test]
    fn test_open_missing_file() -> Result<()> {
        let (_dir, pool) = create_test_pool(10)?;

        assert!(matches!(
            HeapFile::open(pool, "missing"),
            Err(AccessError::Storage(StorageError::FileNotFound(_)))
        ));

        Ok(())
    }

    #[test]
    fn test_open_uninitialized_file_fails() -> Result<()> {
        let (_dir, pool) = create_test_pool(10)?;

        // A bare file without the header page is not a heap file
        pool.create_file("raw")?;
        assert!(matches!(
            HeapFile::open(pool.clone(), "raw"),
            Err(AccessError::Storage(StorageError::PageNotFound { .. }))
        ));
        // The failed open left no handle behind
        assert!(pool.destroy_file("raw").is_ok());

        Ok(())
    }

    #[test]
    fn test_open_corrupt_header() -> Result<()> {
        let (_dir, pool) = create_test_pool(10)?;

        // Page 0 exists but carries no header record
        pool.create_file("empty")?;
        let file_id = pool.open_file("empty")?;
        let (page_id, mut guard) = pool.allocate_page(file_id)?;
        HeapPage::new(&mut guard, page_id);
        drop(guard);
        pool.close_file(file_id)?;

        assert!(matches!(
            HeapFile::open(pool, "empty"),
            Err(AccessError::Corrupt(_))
        ));

        Ok(())
    }

    #[test]
    fn test_get_record_by_rid() -> Result<()> {
        let (_dir, pool) = create_test_pool(10)?;

        create_heap_file(&pool, "orders")?;
        let mut file = HeapFile::open(pool.clone(), "orders")?;

        // Plant a record on the data page through the pool
        let file_id = pool.open_file("orders")?;
        let slot = {
            let mut guard = pool.fetch_page(file_id, PageId(1))?;
            let slot = {
                let mut page = HeapPage::from_data(&mut guard);
                page.insert_record(b"some payload")?
            };
            guard.mark_dirty();
            slot
        };
        pool.close_file(file_id)?;

        let rid = RecordId::new(PageId(1), slot);
        let record = file.get_record(rid)?;
        assert_eq!(record.rid, rid);
        assert_eq!(record.data, b"some payload");

        assert!(matches!(
            file.get_record(RecordId::new(PageId(1), 99)),
            Err(AccessError::Storage(StorageError::RecordNotFound { .. }))
        ));

        Ok(())
    }

    #[test]
    fn test_drop_releases_pins() -> Result<()> {
        let (_dir, pool) = create_test_pool(10)?;

        create_heap_file(&pool, "orders")?;
        assert_eq!(pool.pinned_frame_count(), 0);

        let file = HeapFile::open(pool.clone(), "orders")?;
        // Header page plus the first data page
        assert_eq!(pool.pinned_frame_count(), 2);

        drop(file);
        assert_eq!(pool.pinned_frame_count(), 0);

        Ok(())
    }

    #[test]
    fn test_handles_share_header_page() -> Result<()> {
        let (_dir, pool) = create_test_pool(10)?;

        create_heap_file(&pool, "orders")?;
        let mut file = HeapFile::open(pool.clone(), "orders")?;
        assert_eq!(file.record_count()?, 0);

        // A second handle's inserts land in the same pinned header frame,
        // so the first handle sees them without reopening
        let mut inserter = HeapInserter::open(pool.clone(), "orders")?;
        inserter.insert_record(b"from the other handle")?;
        inserter.insert_record(b"and another")?;
        drop(inserter);

        assert_eq!(file.record_count()?, 2);

        Ok(())
    }

    #[test]
    fn test_created_file_survives_pool_restart() -> Result<()> {
        let dir = tempdir()?;

        {
            let file_manager = FileManager::new(dir.path())?;
            let replacer = Box::new(LruReplacer::new(10));
            let pool = BufferPoolManager::new(file_manager, replacer, 10);
            create_heap_file(&pool, "orders")?;
            // Nothing held the file open, so create's own close did the
            // flushing
        }

        let file_manager = FileManager::new(dir.path())?;
        let replacer = Box::new(LruReplacer::new(10));
        let pool = BufferPoolManager::new(file_manager, replacer, 10);
        let mut file = HeapFile::open(pool, "orders")?;
        assert_eq!(file.record_count()?, 0);
        assert_eq!(file.page_count()?, 1);
        assert_eq!(file.first_page()?, Some(PageId(1)));

        Ok(())
    }

    #[test]
    fn test_pin_page_moves_the_single_data_pin() -> Result<()> {
        let (_dir, pool) = create_test_pool(10)?;

        create_heap_file(&pool, "orders")?;
        let mut file = HeapFile::open(pool.clone(), "orders")?;
        assert_eq!(file.current_page_id(), Some(PageId(1)));

        // Same page: the pin is kept, not cycled
        file.pin_page(PageId(1))?;
        assert_eq!(pool.pinned_frame_count(), 2);

        // Different page: the old pin is dropped
        file.pin_page(PageId(0))?;
        assert_eq!(file.current_page_id(), Some(PageId(0)));
        file.pin_page(PageId(1))?;
        assert_eq!(file.current_page_id(), Some(PageId(1)));
        assert_eq!(pool.pinned_frame_count(), 2);

        Ok(())
    }
}
