//! Pluggable blob storage for index segments.
//!
//! A [`Storage`] is a flat namespace of named blobs that can be listed, read,
//! written and deleted. The index engine persists its segments into a storage
//! through [`StorageDirectory`](directory::StorageDirectory).
//!
//! Three bindings are provided:
//!
//! - [`memory::MemoryStorage`] keeps blobs in process memory
//! - [`file::FileStorage`] keeps one file per blob in a local directory
//! - [`azure::AzureBlobStorage`] keeps blobs in an Azure Blob Storage container

pub mod azure;
pub mod directory;
pub mod file;
mod lease;
pub mod memory;

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use self::azure::{AzureBlobStorage, AzureStorageConfig};
use self::file::{FileStorage, FileStorageConfig};
use self::memory::{MemoryStorage, MemoryStorageConfig};

/// Capability set of a blob store.
///
/// Implementations must be safe to share between threads: the index engine
/// reads and writes segment files from its own worker threads.
pub trait Storage: Send + Sync + Debug {
    /// Names of every blob currently in the store.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Whether a blob with this name exists.
    fn file_exists(&self, name: &str) -> Result<bool>;

    /// Read the full contents of a blob.
    ///
    /// A missing blob is reported as a storage error with
    /// [`std::io::ErrorKind::NotFound`].
    fn read_file(&self, name: &str) -> Result<Vec<u8>>;

    /// Create or replace a blob.
    fn write_file(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Create a blob only if no blob with this name exists yet.
    ///
    /// Returns `false` and leaves the existing blob untouched when the name
    /// is taken. The check and the creation are one atomic step.
    fn create_file(&self, name: &str, data: &[u8]) -> Result<bool>;

    /// Delete a blob. Deleting a missing blob is a not-found storage error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// Take the exclusive lock `name` without waiting.
    ///
    /// Returns `None` while another holder has it. The lock is released when
    /// the returned guard is dropped, and must not outlive a holder that died
    /// without dropping it. Lock entries never show up in [`list_files`](Self::list_files).
    fn try_lock(&self, name: &str) -> Result<Option<StorageLock>>;

    /// Make previous writes durable.
    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Prefix of the entries that back storage locks.
pub const LOCK_PREFIX: &str = ".lock-";

/// Name of the entry backing the lock `name`.
pub(crate) fn lock_entry_name(name: &str) -> String {
    format!("{LOCK_PREFIX}{name}")
}

/// An exclusive lock taken with [`Storage::try_lock`]. Dropping it releases
/// the lock.
pub struct StorageLock {
    name: String,
    _guard: Box<dyn Send + Sync>,
}

impl StorageLock {
    pub fn new<G: Send + Sync + 'static>(name: impl Into<String>, guard: G) -> Self {
        Self {
            name: name.into(),
            _guard: Box::new(guard),
        }
    }

    /// Name the lock was taken under.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Debug for StorageLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageLock").field("name", &self.name).finish()
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// In-memory storage.
    Memory(MemoryStorageConfig),
    /// Local filesystem storage.
    File(FileStorageConfig),
    /// Azure Blob Storage container.
    Azure(AzureStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStorageConfig::default())
    }
}

/// Builds a [`Storage`] from a [`StorageConfig`].
pub struct StorageFactory;

impl StorageFactory {
    /// Create the storage described by `config`.
    ///
    /// Only local validation happens here; a cloud container is not contacted
    /// until the first read or write.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(config) => Ok(Arc::new(MemoryStorage::new(config))),
            StorageConfig::File(config) => Ok(Arc::new(FileStorage::new(config)?)),
            StorageConfig::Azure(config) => Ok(Arc::new(AzureBlobStorage::new(config)?)),
        }
    }
}
