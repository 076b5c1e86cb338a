//! Index engine directory over a [`Storage`].
//!
//! The index engine addresses its segment files by path and expects random
//! access reads and streaming writes. [`StorageDirectory`] maps both onto
//! whole-blob operations: a read loads the full blob into memory, a write is
//! buffered and persisted as one blob when flushed.
//!
//! Engine locks map onto [`Storage::try_lock`], so a lock held by a process
//! that died does not block the index forever.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tantivy::directory::error::{DeleteError, LockError, OpenReadError, OpenWriteError};
use tantivy::directory::{
    AntiCallToken, Directory, DirectoryLock, FileHandle, FileSlice, Lock, TerminatingWrite,
    WatchCallback, WatchHandle, WritePtr,
};

use crate::error::Result;
use crate::storage::Storage;

/// Attempts made for a blocking lock before giving up.
const LOCK_RETRIES: usize = 100;
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Exposes a [`Storage`] as an index engine directory.
#[derive(Debug, Clone)]
pub struct StorageDirectory {
    storage: Arc<dyn Storage>,
}

impl StorageDirectory {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The underlying storage.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Names of every blob in the directory.
    pub fn list_all(&self) -> Result<Vec<String>> {
        self.storage.list_files()
    }

    /// Delete one blob by name.
    pub fn delete_file(&self, name: &str) -> Result<()> {
        self.storage.delete_file(name)
    }

    fn read(&self, path: &Path) -> std::result::Result<Vec<u8>, OpenReadError> {
        let name = blob_name(path);
        self.storage.read_file(&name).map_err(|e| {
            if e.is_not_found() {
                OpenReadError::FileDoesNotExist(path.to_path_buf())
            } else {
                OpenReadError::IoError {
                    io_error: Arc::new(e.into()),
                    filepath: path.to_path_buf(),
                }
            }
        })
    }
}

fn blob_name(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Directory for StorageDirectory {
    fn get_file_handle(
        &self,
        path: &Path,
    ) -> std::result::Result<Arc<dyn FileHandle>, OpenReadError> {
        let data = self.read(path)?;
        Ok(Arc::new(FileSlice::from(data)))
    }

    fn delete(&self, path: &Path) -> std::result::Result<(), DeleteError> {
        self.storage.delete_file(&blob_name(path)).map_err(|e| {
            if e.is_not_found() {
                DeleteError::FileDoesNotExist(path.to_path_buf())
            } else {
                DeleteError::IoError {
                    io_error: Arc::new(e.into()),
                    filepath: path.to_path_buf(),
                }
            }
        })
    }

    fn exists(&self, path: &Path) -> std::result::Result<bool, OpenReadError> {
        self.storage
            .file_exists(&blob_name(path))
            .map_err(|e| OpenReadError::IoError {
                io_error: Arc::new(e.into()),
                filepath: path.to_path_buf(),
            })
    }

    fn open_write(&self, path: &Path) -> std::result::Result<WritePtr, OpenWriteError> {
        let name = blob_name(path);
        let io_error = |e: crate::error::SearchError| OpenWriteError::IoError {
            io_error: Arc::new(e.into()),
            filepath: path.to_path_buf(),
        };

        if !self.storage.create_file(&name, &[]).map_err(io_error)? {
            return Err(OpenWriteError::FileAlreadyExists(path.to_path_buf()));
        }

        let writer = BlobWriter {
            storage: Arc::clone(&self.storage),
            path: path.to_path_buf(),
            name,
            data: Vec::new(),
            flushed: true,
        };
        Ok(io::BufWriter::new(Box::new(writer)))
    }

    fn acquire_lock(&self, lock: &Lock) -> std::result::Result<DirectoryLock, LockError> {
        let name = blob_name(&lock.filepath);
        let mut attempts = 0;
        loop {
            let held = self
                .storage
                .try_lock(&name)
                .map_err(|e| LockError::wrap_io_error(e.into()))?;
            match held {
                Some(held) => return Ok(DirectoryLock::from(Box::new(held))),
                None if lock.is_blocking && attempts < LOCK_RETRIES => {
                    attempts += 1;
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                None => return Err(LockError::LockBusy),
            }
        }
    }

    fn atomic_read(&self, path: &Path) -> std::result::Result<Vec<u8>, OpenReadError> {
        self.read(path)
    }

    fn atomic_write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.storage
            .write_file(&blob_name(path), data)
            .map_err(io::Error::from)
    }

    fn sync_directory(&self) -> io::Result<()> {
        self.storage.sync().map_err(io::Error::from)
    }

    fn watch(&self, _watch_callback: WatchCallback) -> tantivy::Result<WatchHandle> {
        // Readers are always opened fresh, so change notification is not needed.
        Ok(WatchHandle::empty())
    }
}

/// Buffers a file in memory and persists it as a single blob on flush.
struct BlobWriter {
    storage: Arc<dyn Storage>,
    path: PathBuf,
    name: String,
    data: Vec<u8>,
    flushed: bool,
}

impl Write for BlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.flushed = false;
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.flushed {
            return Ok(());
        }
        self.storage
            .write_file(&self.name, &self.data)
            .map_err(io::Error::from)?;
        self.flushed = true;
        Ok(())
    }
}

impl TerminatingWrite for BlobWriter {
    fn terminate_ref(&mut self, _: AntiCallToken) -> io::Result<()> {
        self.flush()
    }
}

impl Drop for BlobWriter {
    fn drop(&mut self) {
        if !self.flushed {
            log::warn!(
                "index file {} dropped without being flushed ({} bytes lost)",
                self.path.display(),
                self.data.len()
            );
        }
    }
}
