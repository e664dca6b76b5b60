pub mod lru;
pub mod replacer;

use crate::storage::disk::{FileId, FileManager, PAGE_SIZE};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use dashmap::DashMap;
use log::debug;
use parking_lot::{Mutex, RwLock};
use replacer::{FrameId, Replacer};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// A resident page is addressed by file and page id.
type PageKey = (FileId, PageId);

pub struct Frame {
    data: Box<[u8; PAGE_SIZE]>,
    key: Option<PageKey>,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

impl Frame {
    fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_SIZE]),
            key: None,
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    fn reset(&mut self) {
        self.key = None;
        self.pin_count.store(0, Ordering::SeqCst);
        self.is_dirty.store(false, Ordering::SeqCst);
        self.data.fill(0);
    }
}

/// Page cache over a [`FileManager`]. Cloning shares the pool.
///
/// Pages are handed out as pinned [`PageGuard`]s; the pin is released when
/// the guard drops. Unpinned frames are evicted on demand through the
/// replacer, with dirty write-back. Lock order throughout is file manager,
/// then frames, then replacer.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    page_table: DashMap<PageKey, FrameId>,
    frames: RwLock<HashMap<FrameId, Frame>>,
    replacer: Mutex<Box<dyn Replacer>>,
    file_manager: Mutex<FileManager>,
    next_frame_id: AtomicU32,
    max_frames: usize,
}

impl BufferPoolManager {
    pub fn new(file_manager: FileManager, replacer: Box<dyn Replacer>, max_frames: usize) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                page_table: DashMap::new(),
                frames: RwLock::new(HashMap::with_capacity(max_frames)),
                replacer: Mutex::new(replacer),
                file_manager: Mutex::new(file_manager),
                next_frame_id: AtomicU32::new(0),
                max_frames,
            }),
        }
    }

    pub fn create_file(&self, name: &str) -> StorageResult<()> {
        self.inner.file_manager.lock().create_file(name)
    }

    pub fn open_file(&self, name: &str) -> StorageResult<FileId> {
        self.inner.file_manager.lock().open_file(name)
    }

    /// Close one handle on the file. The last close flushes the file's
    /// dirty frames and drops its unpinned frames from the pool, so the
    /// file's on-disk state is complete when the descriptor goes away.
    pub fn close_file(&self, file_id: FileId) -> StorageResult<()> {
        let last_open = self.inner.file_manager.lock().open_count(file_id)? == 1;
        if last_open {
            self.flush_file(file_id)?;
            self.purge_unpinned(file_id);
        }
        self.inner.file_manager.lock().close_file(file_id)?;
        Ok(())
    }

    pub fn destroy_file(&self, name: &str) -> StorageResult<()> {
        self.inner.file_manager.lock().destroy_file(name)
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.inner.file_manager.lock().file_exists(name)
    }

    pub fn first_page_id(&self, file_id: FileId) -> StorageResult<PageId> {
        self.inner.file_manager.lock().first_page_id(file_id)
    }

    /// Pin an existing page. The returned guard reads the page as it is on
    /// disk (or as left by earlier writers); the frame's dirty flag is not
    /// touched.
    pub fn fetch_page(&self, file_id: FileId, page_id: PageId) -> StorageResult<PageGuard> {
        let key = (file_id, page_id);

        // Check if page is already in the pool
        if let Some(frame_id) = self.inner.page_table.get(&key).map(|entry| *entry.value()) {
            let mut frames = self.inner.frames.write();
            if let Some(frame) = frames.get_mut(&frame_id) {
                // The frame may have been evicted and reused since the
                // page-table lookup
                if frame.key == Some(key) {
                    frame.pin_count.fetch_add(1, Ordering::SeqCst);
                    self.inner.replacer.lock().pin(frame_id);

                    let data = frame.data.as_mut() as *mut [u8; PAGE_SIZE];
                    drop(frames);

                    return Ok(PageGuard {
                        inner: self.inner.clone(),
                        frame_id,
                        file_id,
                        page_id,
                        data,
                    });
                }
            }
        }

        // Page not resident, load it from disk
        let frame_id = self.get_frame()?;

        let data = {
            let mut file_manager = self.inner.file_manager.lock();
            let mut frames = self.inner.frames.write();
            let frame = frames.get_mut(&frame_id).unwrap();

            if let Err(e) = file_manager.read_page(file_id, page_id, frame.data.as_mut()) {
                drop(frames);
                drop(file_manager);
                // Leave the unused frame evictable
                self.inner.replacer.lock().unpin(frame_id);
                return Err(e);
            }
            frame.key = Some(key);
            frame.pin_count.store(1, Ordering::SeqCst);
            frame.is_dirty.store(false, Ordering::SeqCst);

            frame.data.as_mut() as *mut [u8; PAGE_SIZE]
        };

        self.inner.page_table.insert(key, frame_id);
        self.inner.replacer.lock().pin(frame_id);

        Ok(PageGuard {
            inner: self.inner.clone(),
            frame_id,
            file_id,
            page_id,
            data,
        })
    }

    /// Extend the file by one page and pin it. The frame is dirty from
    /// birth: a freshly allocated page must reach disk even if the caller
    /// never mutates it further.
    pub fn allocate_page(&self, file_id: FileId) -> StorageResult<(PageId, PageGuard)> {
        let frame_id = self.get_frame()?;

        let (page_id, data) = {
            let mut file_manager = self.inner.file_manager.lock();
            let mut frames = self.inner.frames.write();
            let frame = frames.get_mut(&frame_id).unwrap();

            let page_id = match file_manager.allocate_page(file_id) {
                Ok(page_id) => page_id,
                Err(e) => {
                    drop(frames);
                    drop(file_manager);
                    self.inner.replacer.lock().unpin(frame_id);
                    return Err(e);
                }
            };

            frame.reset();
            frame.key = Some((file_id, page_id));
            frame.pin_count.store(1, Ordering::SeqCst);
            frame.is_dirty.store(true, Ordering::SeqCst);

            (page_id, frame.data.as_mut() as *mut [u8; PAGE_SIZE])
        };

        self.inner.page_table.insert((file_id, page_id), frame_id);
        self.inner.replacer.lock().pin(frame_id);

        Ok((
            page_id,
            PageGuard {
                inner: self.inner.clone(),
                frame_id,
                file_id,
                page_id,
                data,
            },
        ))
    }

    pub fn flush_page(&self, file_id: FileId, page_id: PageId) -> StorageResult<()> {
        let key = (file_id, page_id);
        if let Some(frame_id) = self.inner.page_table.get(&key).map(|entry| *entry.value()) {
            let mut file_manager = self.inner.file_manager.lock();
            let frames = self.inner.frames.read();
            if let Some(frame) = frames.get(&frame_id) {
                if frame.key == Some(key) && frame.is_dirty.load(Ordering::SeqCst) {
                    file_manager.write_page(file_id, page_id, frame.data.as_ref())?;
                    frame.is_dirty.store(false, Ordering::SeqCst);
                }
            }
        }
        Ok(())
    }

    pub fn flush_file(&self, file_id: FileId) -> StorageResult<()> {
        let mut file_manager = self.inner.file_manager.lock();
        let frames = self.inner.frames.read();

        for frame in frames.values() {
            if let Some((fid, page_id)) = frame.key {
                if fid == file_id && frame.is_dirty.load(Ordering::SeqCst) {
                    file_manager.write_page(fid, page_id, frame.data.as_ref())?;
                    frame.is_dirty.store(false, Ordering::SeqCst);
                }
            }
        }

        Ok(())
    }

    pub fn flush_all(&self) -> StorageResult<()> {
        let mut file_manager = self.inner.file_manager.lock();
        let frames = self.inner.frames.read();

        for frame in frames.values() {
            if let Some((file_id, page_id)) = frame.key {
                if frame.is_dirty.load(Ordering::SeqCst) {
                    file_manager.write_page(file_id, page_id, frame.data.as_ref())?;
                    frame.is_dirty.store(false, Ordering::SeqCst);
                }
            }
        }

        Ok(())
    }

    /// Number of frames currently pinned by at least one guard.
    pub fn pinned_frame_count(&self) -> usize {
        let frames = self.inner.frames.read();
        frames
            .values()
            .filter(|frame| frame.pin_count.load(Ordering::SeqCst) > 0)
            .count()
    }

    fn purge_unpinned(&self, file_id: FileId) {
        let mut frames = self.inner.frames.write();
        for frame in frames.values_mut() {
            let belongs = matches!(frame.key, Some((fid, _)) if fid == file_id);
            if belongs && frame.pin_count.load(Ordering::SeqCst) == 0 {
                if let Some(key) = frame.key {
                    self.inner.page_table.remove(&key);
                }
                frame.reset();
            }
        }
    }

    fn get_frame(&self) -> StorageResult<FrameId> {
        // Try to allocate a new frame if under the limit
        {
            let frames = self.inner.frames.read();
            if frames.len() < self.inner.max_frames {
                drop(frames);
                let mut frames = self.inner.frames.write();
                // Double-check after acquiring write lock
                if frames.len() < self.inner.max_frames {
                    let frame_id = self.inner.next_frame_id.fetch_add(1, Ordering::SeqCst);
                    frames.insert(frame_id, Frame::new());
                    return Ok(frame_id);
                }
            }
        }

        // Need to evict a frame
        let evict_frame_id = {
            let mut replacer = self.inner.replacer.lock();
            replacer.evict().ok_or(StorageError::BufferPoolFull)?
        };

        // Snapshot the victim so the write-back runs without the frames lock
        let (old_key, is_dirty, data) = {
            let frames = self.inner.frames.read();
            match frames.get(&evict_frame_id) {
                Some(frame) => (
                    frame.key,
                    frame.is_dirty.load(Ordering::SeqCst),
                    frame.data.clone(),
                ),
                None => return Ok(evict_frame_id),
            }
        };

        if let Some((file_id, page_id)) = old_key {
            if is_dirty {
                debug!("evicting dirty page {} of file {}", page_id, file_id);
                let mut file_manager = self.inner.file_manager.lock();
                if let Err(e) = file_manager.write_page(file_id, page_id, data.as_ref()) {
                    drop(file_manager);
                    // Put the victim back; its contents are still the only
                    // copy of the page
                    self.inner.replacer.lock().unpin(evict_frame_id);
                    return Err(e);
                }
            }
            self.inner.page_table.remove(&(file_id, page_id));
        }

        // Reset frame
        {
            let mut frames = self.inner.frames.write();
            if let Some(frame) = frames.get_mut(&evict_frame_id) {
                frame.reset();
            }
        }

        Ok(evict_frame_id)
    }
}

/// Pinned page. Derefs to the page bytes; dropping it releases the pin.
pub struct PageGuard {
    inner: Arc<BufferPoolInner>,
    frame_id: FrameId,
    file_id: FileId,
    page_id: PageId,
    data: *mut [u8; PAGE_SIZE],
}

impl PageGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Record that the page bytes were mutated. Eviction and flush only
    /// write frames with this flag set; a mutation without it is lost when
    /// the frame is evicted.
    pub fn mark_dirty(&self) {
        let frames = self.inner.frames.read();
        if let Some(frame) = frames.get(&self.frame_id) {
            frame.is_dirty.store(true, Ordering::SeqCst);
        }
    }
}

impl Deref for PageGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.data }
    }
}

impl DerefMut for PageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.data }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        // Decrement pin count
        let should_unpin = {
            let frames = self.inner.frames.read();
            if let Some(frame) = frames.get(&self.frame_id) {
                let old_count = frame.pin_count.fetch_sub(1, Ordering::SeqCst);
                old_count == 1
            } else {
                false
            }
        };

        if should_unpin {
            self.inner.replacer.lock().unpin(self.frame_id);
        }
    }
}

// The pin keeps the frame resident, so the raw pointer stays valid until
// drop; exclusive mutation is the holder's contract.
unsafe impl Send for PageGuard {}
unsafe impl Sync for PageGuard {}
