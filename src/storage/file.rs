//! Local filesystem storage binding.
//!
//! Each blob is one file directly inside the configured directory. Writes go
//! to a hidden temporary file first and are renamed into place, so a reader
//! never observes a partially written blob.
//!
//! Locks are OS advisory locks on `.lock-*` files in the same directory, so
//! the operating system releases them when the holding process exits.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::storage::{LOCK_PREFIX, Storage, StorageLock, lock_entry_name};

const TEMP_PREFIX: &str = ".tmp-";

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Directory holding the blobs. Created if missing.
    pub path: PathBuf,
    /// Call `fsync` on every written blob.
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
}

fn default_sync_writes() -> bool {
    true
}

impl FileStorageConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sync_writes: default_sync_writes(),
        }
    }

    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }
}

/// Blob store backed by a local directory.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    sync_writes: bool,
}

impl FileStorage {
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.path).map_err(|e| {
            SearchError::storage(format!("create directory {}", config.path.display()), e)
        })?;
        if !config.path.is_dir() {
            return Err(SearchError::invalid_config(format!(
                "{} is not a directory",
                config.path.display()
            )));
        }
        Ok(Self {
            directory: config.path,
            sync_writes: config.sync_writes,
        })
    }

    /// The directory holding the blobs.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.starts_with(TEMP_PREFIX)
            || name.starts_with(LOCK_PREFIX)
            || name.contains(['/', '\\'])
            || name == "."
            || name == ".."
        {
            return Err(SearchError::invalid_argument(format!(
                "invalid blob name '{name}'"
            )));
        }
        Ok(self.directory.join(name))
    }
}

/// Open lock file holding the advisory lock.
struct FileLockGuard {
    file: File,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("failed to unlock lock file: {e}");
        }
    }
}

fn is_lock_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Storage for FileStorage {
    fn list_files(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.directory).map_err(|e| {
            SearchError::storage(format!("list {}", self.directory.display()), e)
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with(TEMP_PREFIX) && !name.starts_with(LOCK_PREFIX) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        Ok(self.blob_path(name)?.is_file())
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(name)?;
        fs::read(&path).map_err(|e| SearchError::storage(format!("read '{name}'"), e))
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.blob_path(name)?;
        let temp_path = self
            .directory
            .join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4()));

        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(data)?;
            if self.sync_writes {
                file.sync_all()?;
            }
            fs::rename(&temp_path, &path)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            SearchError::storage(format!("write '{name}'"), e)
        })
    }

    fn create_file(&self, name: &str, data: &[u8]) -> Result<bool> {
        let path = self.blob_path(name)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(SearchError::storage(format!("create '{name}'"), e)),
        };
        let mut write = || -> io::Result<()> {
            file.write_all(data)?;
            if self.sync_writes {
                file.sync_all()?;
            }
            Ok(())
        };
        write().map_err(|e| SearchError::storage(format!("create '{name}'"), e))?;
        Ok(true)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.blob_path(name)?;
        fs::remove_file(&path).map_err(|e| SearchError::storage(format!("delete '{name}'"), e))
    }

    fn try_lock(&self, name: &str) -> Result<Option<StorageLock>> {
        self.blob_path(name)?;
        let path = self.directory.join(lock_entry_name(name));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| SearchError::storage(format!("open lock '{name}'"), e))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(StorageLock::new(name, FileLockGuard { file }))),
            Err(e) if is_lock_contended(&e) => Ok(None),
            Err(e) => Err(SearchError::storage(format!("lock '{name}'"), e)),
        }
    }

    fn sync(&self) -> Result<()> {
        // Directory fsync is only meaningful on unix.
        #[cfg(unix)]
        {
            let dir = fs::File::open(&self.directory)?;
            dir.sync_all()?;
        }
        Ok(())
    }
}
