//! In-memory storage binding.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::storage::{Storage, StorageLock};

/// Configuration for [`MemoryStorage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStorageConfig {
    /// Expected number of blobs, used to pre-size the table.
    #[serde(default)]
    pub initial_capacity: usize,
}

/// Blob store held entirely in process memory.
///
/// Contents and locks are lost when the last handle is dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<String, Arc<Vec<u8>>>>,
    locks: Arc<Mutex<HashSet<String>>>,
}

impl MemoryStorage {
    pub fn new(config: MemoryStorageConfig) -> Self {
        Self {
            files: RwLock::new(HashMap::with_capacity(config.initial_capacity)),
            locks: Arc::default(),
        }
    }
}

/// Held lock; removes its name from the shared set on drop.
struct MemoryLockGuard {
    locks: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.name);
    }
}

impl Storage for MemoryStorage {
    fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        Ok(self.files.read().contains_key(name))
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .get(name)
            .map(|data| data.as_ref().clone())
            .ok_or_else(|| SearchError::file_not_found("read", name))
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        self.files
            .write()
            .insert(name.to_string(), Arc::new(data.to_vec()));
        Ok(())
    }

    fn create_file(&self, name: &str, data: &[u8]) -> Result<bool> {
        match self.files.write().entry(name.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(data.to_vec()));
                Ok(true)
            }
        }
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        match self.files.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(SearchError::file_not_found("delete", name)),
        }
    }

    fn try_lock(&self, name: &str) -> Result<Option<StorageLock>> {
        if !self.locks.lock().insert(name.to_string()) {
            return Ok(None);
        }
        let guard = MemoryLockGuard {
            locks: Arc::clone(&self.locks),
            name: name.to_string(),
        };
        Ok(Some(StorageLock::new(name, guard)))
    }
}
