use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const PAGE_SIZE: usize = 8192;

/// Longest accepted file name.
pub const MAX_FILE_NAME: usize = 128;

/// Process-local handle to an open file. Not persisted; a file gets a fresh
/// id each time it goes from closed to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct OpenFile {
    name: String,
    file: File,
    open_count: u32,
}

/// Named page files under a root directory. Opens are reference counted:
/// the descriptor is shared by every handle on the same name and dropped
/// when the last one closes. A file cannot be destroyed while open.
pub struct FileManager {
    root: PathBuf,
    files: HashMap<FileId, OpenFile>,
    ids_by_name: HashMap<String, FileId>,
    next_file_id: u32,
}

impl FileManager {
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            files: HashMap::new(),
            ids_by_name: HashMap::new(),
            next_file_id: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create_file(&mut self, name: &str) -> StorageResult<()> {
        validate_name(name)?;
        let path = self.file_path(name);
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::FileAlreadyExists(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn open_file(&mut self, name: &str) -> StorageResult<FileId> {
        validate_name(name)?;
        if let Some(&file_id) = self.ids_by_name.get(name) {
            if let Some(open_file) = self.files.get_mut(&file_id) {
                open_file.open_count += 1;
                return Ok(file_id);
            }
        }

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.file_path(name))
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::FileNotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let file_id = FileId(self.next_file_id);
        self.next_file_id += 1;
        self.files.insert(
            file_id,
            OpenFile {
                name: name.to_string(),
                file,
                open_count: 1,
            },
        );
        self.ids_by_name.insert(name.to_string(), file_id);
        Ok(file_id)
    }

    /// Decrement the open count. Returns true when this was the last open
    /// and the descriptor has been dropped.
    pub fn close_file(&mut self, file_id: FileId) -> StorageResult<bool> {
        let open_file = self
            .files
            .get_mut(&file_id)
            .ok_or(StorageError::UnknownFile(file_id))?;
        open_file.open_count -= 1;
        if open_file.open_count > 0 {
            return Ok(false);
        }

        let name = open_file.name.clone();
        self.files.remove(&file_id);
        self.ids_by_name.remove(&name);
        Ok(true)
    }

    pub fn open_count(&self, file_id: FileId) -> StorageResult<u32> {
        Ok(self.get(file_id)?.open_count)
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.ids_by_name.contains_key(name)
    }

    pub fn file_exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.file_path(name).exists()
    }

    pub fn destroy_file(&mut self, name: &str) -> StorageResult<()> {
        validate_name(name)?;
        if self.is_open(name) {
            return Err(StorageError::FileInUse(name.to_string()));
        }
        match fs::remove_file(self.file_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_page(
        &mut self,
        file_id: FileId,
        page_id: PageId,
        buf: &mut [u8; PAGE_SIZE],
    ) -> StorageResult<()> {
        let open_file = self.get_mut(file_id)?;
        let offset = page_offset(page_id);
        let file_size = open_file.file.metadata()?.len();

        if offset >= file_size {
            return Err(StorageError::PageNotFound {
                file: file_id,
                page: page_id,
            });
        }

        open_file.file.seek(SeekFrom::Start(offset))?;
        open_file.file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_page(
        &mut self,
        file_id: FileId,
        page_id: PageId,
        data: &[u8; PAGE_SIZE],
    ) -> StorageResult<()> {
        let open_file = self.get_mut(file_id)?;
        let offset = page_offset(page_id);
        let file_size = open_file.file.metadata()?.len();

        // Extend file if necessary
        if offset >= file_size {
            open_file.file.set_len(offset + PAGE_SIZE as u64)?;
        }

        open_file.file.seek(SeekFrom::Start(offset))?;
        open_file.file.write_all(data)?;
        open_file.file.sync_all()?;
        Ok(())
    }

    pub fn allocate_page(&mut self, file_id: FileId) -> StorageResult<PageId> {
        let current_pages = self.num_pages(file_id)?;
        let new_page_id = PageId(current_pages);

        // Extend file to include the new page
        let open_file = self.get_mut(file_id)?;
        let new_size = (current_pages as u64 + 1) * PAGE_SIZE as u64;
        open_file.file.set_len(new_size)?;

        Ok(new_page_id)
    }

    pub fn num_pages(&self, file_id: FileId) -> StorageResult<u32> {
        let file_size = self.get(file_id)?.file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as u32)
    }

    /// Id of the file's first page (the header page). Fails on a file that
    /// has never been initialized, which is what a bare `create_file`
    /// leaves behind.
    pub fn first_page_id(&self, file_id: FileId) -> StorageResult<PageId> {
        if self.num_pages(file_id)? == 0 {
            return Err(StorageError::PageNotFound {
                file: file_id,
                page: PageId(0),
            });
        }
        Ok(PageId(0))
    }

    fn get(&self, file_id: FileId) -> StorageResult<&OpenFile> {
        self.files
            .get(&file_id)
            .ok_or(StorageError::UnknownFile(file_id))
    }

    fn get_mut(&mut self, file_id: FileId) -> StorageResult<&mut OpenFile> {
        self.files
            .get_mut(&file_id)
            .ok_or(StorageError::UnknownFile(file_id))
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

fn validate_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_FILE_NAME
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidFileName(name.to_string()))
    }
}

fn page_offset(page_id: PageId) -> u64 {
    page_id.0 as u64 * PAGE_SIZE as u64
}
