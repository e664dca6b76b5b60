pub mod file_manager;

pub use file_manager::{FileId, FileManager, PAGE_SIZE};
