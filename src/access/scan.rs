//! Sequential scans over a heap file's page chain.

use crate::access::error::{AccessError, AccessResult};
use crate::access::heap::HeapFile;
use crate::access::predicate::ScanPredicate;
use crate::access::record::{Record, RecordId};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::page::{HeapPage, PageId};

/// Saved scan position for `mark_scan` / `reset_scan`.
struct ScanMark {
    page: Option<PageId>,
    cursor: Option<RecordId>,
}

/// Cursor over a heap file, visiting live records in page-then-slot order,
/// optionally filtered by a [`ScanPredicate`].
///
/// The cursor starts before the first record; `scan_next` advances it and
/// returns the id of the next matching record, or `None` once the chain is
/// exhausted. `get_record` and `delete_record` act on the record the cursor
/// is on. A freshly opened scan reuses the handle's already-pinned first
/// page, so positioning on the first record costs no extra fetch.
pub struct HeapScan {
    file: HeapFile,
    predicate: Option<ScanPredicate>,
    cursor: Option<RecordId>,
    mark: ScanMark,
}

impl HeapScan {
    pub fn open(pool: BufferPoolManager, name: &str) -> AccessResult<Self> {
        let file = HeapFile::open(pool, name)?;
        let mark = ScanMark {
            page: file.current_page_id(),
            cursor: None,
        };
        Ok(Self {
            file,
            predicate: None,
            cursor: None,
            mark,
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

    /// Install (or clear) the filter applied by subsequent `scan_next`
    /// calls. Rejects malformed predicates; does not move the cursor.
    pub fn start_scan(&mut self, predicate: Option<ScanPredicate>) -> AccessResult<()> {
        if let Some(predicate) = &predicate {
            predicate.validate()?;
        }
        self.predicate = predicate;
        Ok(())
    }

    /// Advance to the next record matching the filter and return its id.
    /// `Ok(None)` means the scan is exhausted; further calls keep returning
    /// it.
    pub fn scan_next(&mut self) -> AccessResult<Option<RecordId>> {
        loop {
            let next_page = {
                let guard = match self.file.current() {
                    Some(guard) => guard,
                    None => return Ok(None),
                };
                let page_id = guard.page_id();
                let page = HeapPage::from_data(guard);

                let mut candidate = match self.cursor {
                    Some(rid) if rid.page_id == page_id => page.next_slot(rid.slot_id),
                    _ => page.first_slot(),
                };

                while let Some(slot_id) = candidate {
                    let rid = RecordId::new(page_id, slot_id);
                    self.cursor = Some(rid);
                    let data = page.get_record(slot_id)?;
                    let matched = self
                        .predicate
                        .as_ref()
                        .map_or(true, |predicate| predicate.matches(data));
                    if matched {
                        return Ok(Some(rid));
                    }
                    candidate = page.next_slot(slot_id);
                }

                page.next_page_id()
            };

            match next_page {
                Some(next) => {
                    self.file.pin_page(next)?;
                }
                None => {
                    self.file.release_current();
                    return Ok(None);
                }
            }
        }
    }

    /// Record under the cursor, copied out of the page.
    pub fn get_record(&mut self) -> AccessResult<Record> {
        let rid = self.current_rid()?;
        self.file.get_record(rid)
    }

    /// Delete the record under the cursor. The cursor stays on the deleted
    /// slot, so the next `scan_next` continues after it.
    pub fn delete_record(&mut self) -> AccessResult<()> {
        let rid = self.current_rid()?;

        let guard = self.file.pin_page(rid.page_id)?;
        {
            let mut page = HeapPage::from_data(&mut *guard);
            page.delete_record(rid.slot_id)?;
        }
        guard.mark_dirty();

        self.file.update_header(|header| {
            header.set_record_count(header.record_count().saturating_sub(1));
        })
    }

    /// Checkpoint the current position.
    pub fn mark_scan(&mut self) {
        self.mark = ScanMark {
            page: self.file.current_page_id(),
            cursor: self.cursor,
        };
    }

    /// Return to the last checkpoint (or the start of the file if none was
    /// taken). Re-pins the marked page only when it differs from the
    /// currently pinned one.
    pub fn reset_scan(&mut self) -> AccessResult<()> {
        match self.mark.page {
            Some(page_id) => {
                self.file.pin_page(page_id)?;
            }
            None => self.file.release_current(),
        }
        self.cursor = self.mark.cursor;
        Ok(())
    }

    /// Terminate the scan: releases the data-page pin and clears the
    /// cursor. Idempotent; a later `scan_next` reports exhaustion.
    pub fn end_scan(&mut self) {
        self.file.release_current();
        self.cursor = None;
    }

    /// Flag the currently pinned page dirty after mutating record bytes out
    /// of band. No-op when no page is pinned.
    pub fn mark_dirty(&self) {
        self.file.mark_current_dirty();
    }

    // Not named `position`: that would be shadowed by `Iterator::position`
    // for `&mut self` callers.
    fn current_rid(&self) -> AccessResult<RecordId> {
        if self.file.current_page_id().is_none() {
            return Err(AccessError::NoCurrentRecord);
        }
        self.cursor.ok_or(AccessError::NoCurrentRecord)
    }
}

impl Iterator for HeapScan {
    type Item = AccessResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.scan_next() {
            Ok(Some(_)) => Some(self.get_record()),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::heap::create_heap_file;
    use crate::access::insert::HeapInserter;
    use crate::access::predicate::CompOp;
    use crate::storage::buffer::lru::LruReplacer;
    use crate::storage::disk::FileManager;
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    fn create_test_file(records: &[&[u8]]) -> Result<(TempDir, BufferPoolManager)> {
        let dir = tempdir()?;
        let file_manager = FileManager::new(dir.path())?;
        let replacer = Box::new(LruReplacer::new(10));
        let pool = BufferPoolManager::new(file_manager, replacer, 10);

        create_heap_file(&pool, "scan.db")?;
        let mut inserter = HeapInserter::open(pool.clone(), "scan.db")?;
        for record in records {
            inserter.insert_record(record)?;
        }

        Ok((dir, pool))
    }

    #[test]
    fn test_scan_visits_all_records_in_order() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"one", b"two", b"three"])?;
        let mut scan = HeapScan::open(pool, "scan.db")?;

        let mut seen = Vec::new();
        while let Some(rid) = scan.scan_next()? {
            seen.push((rid, scan.get_record()?.data));
        }

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].1, b"one");
        assert_eq!(seen[1].1, b"two");
        assert_eq!(seen[2].1, b"three");
        // Page-then-slot order
        assert!(seen[0].0 < seen[1].0 && seen[1].0 < seen[2].0);

        // Exhaustion is sticky
        assert_eq!(scan.scan_next()?, None);
        assert_eq!(scan.scan_next()?, None);

        Ok(())
    }

    #[test]
    fn test_scan_empty_file() -> Result<()> {
        let (_dir, pool) = create_test_file(&[])?;
        let mut scan = HeapScan::open(pool, "scan.db")?;

        assert_eq!(scan.scan_next()?, None);

        Ok(())
    }

    #[test]
    fn test_scan_with_predicate() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"apple", b"banana", b"avocado"])?;
        let mut scan = HeapScan::open(pool, "scan.db")?;

        scan.start_scan(Some(ScanPredicate::string(0, CompOp::Eq, b"a")))?;

        let mut matched = Vec::new();
        while scan.scan_next()?.is_some() {
            matched.push(scan.get_record()?.data);
        }
        assert_eq!(matched, vec![b"apple".to_vec(), b"avocado".to_vec()]);

        Ok(())
    }

    #[test]
    fn test_start_scan_rejects_malformed_predicate() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"x"])?;
        let mut scan = HeapScan::open(pool, "scan.db")?;

        use crate::access::predicate::AttrType;
        let bad = ScanPredicate::new(0, 2, AttrType::Int, CompOp::Eq, vec![0, 0]);
        assert!(matches!(
            scan.start_scan(Some(bad)),
            Err(AccessError::InvalidScanParameters(_))
        ));

        Ok(())
    }

    #[test]
    fn test_get_record_requires_position() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"x"])?;
        let mut scan = HeapScan::open(pool, "scan.db")?;

        // Before the first scan_next there is no current record
        assert!(matches!(
            scan.get_record(),
            Err(AccessError::NoCurrentRecord)
        ));

        scan.scan_next()?;
        assert_eq!(scan.get_record()?.data, b"x");

        // Exhausting the scan clears the position again
        assert_eq!(scan.scan_next()?, None);
        assert!(matches!(
            scan.get_record(),
            Err(AccessError::NoCurrentRecord)
        ));

        Ok(())
    }

    #[test]
    fn test_delete_at_cursor() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"keep", b"drop", b"also keep"])?;
        let mut scan = HeapScan::open(pool.clone(), "scan.db")?;
        assert_eq!(scan.record_count()?, 3);

        let first = scan.scan_next()?.expect("first record");
        let second = scan.scan_next()?.expect("second record");
        scan.delete_record()?;
        assert_eq!(scan.record_count()?, 2);

        // The cursor stays on the deleted slot; the scan continues after it
        let third = scan.scan_next()?.expect("third record");
        assert_eq!(scan.get_record()?.data, b"also keep");
        assert!(first < second && second < third);
        assert_eq!(scan.scan_next()?, None);

        // A fresh scan no longer sees the deleted record, and the
        // surviving ids are unchanged
        let mut rescan = HeapScan::open(pool, "scan.db")?;
        assert_eq!(rescan.scan_next()?, Some(first));
        assert_eq!(rescan.scan_next()?, Some(third));
        assert_eq!(rescan.scan_next()?, None);

        Ok(())
    }

    #[test]
    fn test_delete_without_position() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"x"])?;
        let mut scan = HeapScan::open(pool, "scan.db")?;

        assert!(matches!(
            scan.delete_record(),
            Err(AccessError::NoCurrentRecord)
        ));
        assert_eq!(scan.record_count()?, 1);

        Ok(())
    }

    #[test]
    fn test_mark_and_reset() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"a", b"b", b"c"])?;
        let mut scan = HeapScan::open(pool, "scan.db")?;

        scan.scan_next()?;
        scan.mark_scan();

        let after_mark = scan.scan_next()?;
        scan.scan_next()?;

        scan.reset_scan()?;
        assert_eq!(scan.scan_next()?, after_mark);

        Ok(())
    }

    #[test]
    fn test_reset_without_mark_rewinds_to_start() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"a", b"b"])?;
        let mut scan = HeapScan::open(pool, "scan.db")?;

        let first = scan.scan_next()?;
        scan.scan_next()?;
        assert_eq!(scan.scan_next()?, None);

        scan.reset_scan()?;
        assert_eq!(scan.scan_next()?, first);

        Ok(())
    }

    #[test]
    fn test_mark_and_reset_across_pages() -> Result<()> {
        // 2500-byte records: three per page, so five records span two pages
        let payloads: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i; 2500]).collect();
        let records: Vec<&[u8]> = payloads.iter().map(|p| p.as_slice()).collect();
        let (_dir, pool) = create_test_file(&records)?;

        let mut scan = HeapScan::open(pool, "scan.db")?;
        assert_eq!(scan.page_count()?, 2);

        // Mark on the first page
        scan.scan_next()?;
        scan.mark_scan();
        let after_mark = scan.scan_next()?.expect("second record");

        // Walk into the second page
        while scan.scan_next()?.is_some() {}

        scan.reset_scan()?;
        assert_eq!(scan.scan_next()?, Some(after_mark));
        assert_eq!(scan.get_record()?.data, payloads[1]);

        Ok(())
    }

    #[test]
    fn test_end_scan_is_idempotent() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"a", b"b"])?;
        let mut scan = HeapScan::open(pool.clone(), "scan.db")?;

        scan.scan_next()?;
        scan.end_scan();
        assert_eq!(scan.scan_next()?, None);
        assert!(matches!(
            scan.get_record(),
            Err(AccessError::NoCurrentRecord)
        ));
        scan.end_scan();

        // Only the header page stays pinned
        assert_eq!(pool.pinned_frame_count(), 1);

        Ok(())
    }

    #[test]
    fn test_scan_reuses_initial_pin() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"a"])?;
        let mut scan = HeapScan::open(pool.clone(), "scan.db")?;

        // Header page and first data page, pinned at open
        assert_eq!(pool.pinned_frame_count(), 2);

        scan.scan_next()?;
        assert_eq!(pool.pinned_frame_count(), 2);

        Ok(())
    }

    #[test]
    fn test_iterator_adapter() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"one", b"two", b"three"])?;
        let scan = HeapScan::open(pool, "scan.db")?;

        let records: Vec<Record> = scan.collect::<AccessResult<_>>()?;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].data, b"one");
        assert_eq!(records[2].data, b"three");

        Ok(())
    }

    #[test]
    fn test_iterator_next_positions_the_cursor() -> Result<()> {
        let (_dir, pool) = create_test_file(&[b"first", b"second"])?;
        let mut scan = HeapScan::open(pool, "scan.db")?;

        // Advancing through the Iterator impl leaves the cursor on the
        // yielded record, so the positional accessors keep working
        let yielded = scan.next().expect("first record")?;
        assert_eq!(yielded.data, b"first");
        assert_eq!(scan.get_record()?.data, b"first");

        scan.delete_record()?;
        assert_eq!(scan.record_count()?, 1);
        assert_eq!(scan.next().expect("second record")?.data, b"second");
        assert!(scan.next().is_none());

        Ok(())
    }
}
