pub mod heap_page;

use std::fmt;

/// Identifier of a page within one file. Page 0 of every heap file is the
/// header page; data pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(pub u32);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index into a page's slot directory.
pub type SlotId = u16;

pub use heap_page::HeapPage;
