pub mod config;
pub mod document;
pub mod factory;
pub mod query;
pub mod search;
mod session;

use std::sync::Arc;

use parking_lot::Mutex;
use tantivy::IndexWriter;

use crate::error::{Result, SearchError};
use crate::storage::Storage;
use crate::storage::directory::StorageDirectory;

use self::config::EngineConfig;
use self::document::{DocumentMapper, IndexKey};
use self::query::QueryBuilder;
use self::search::{SearchRequest, SearchResult};
use self::session::{IndexOpener, SessionState};

/// Keyed full-text search over a pluggable storage.
///
/// Payload text is indexed under an [`IndexKey`] and can afterwards be found
/// by free-text queries, optionally restricted to scopes. The payload itself
/// is never returned; hits carry the key, scope and entity id.
///
/// Writes are durable when the call returns, except inside a bulk session
/// (see [`begin_bulk`](Self::begin_bulk)), where they become durable when the
/// session ends.
///
/// # Example
///
/// ```rust,no_run
/// use scoped_search::storage::{StorageConfig, StorageFactory};
/// use scoped_search::{EngineConfig, IndexKey, SearchEngine};
///
/// let storage = StorageFactory::create(StorageConfig::default()).unwrap();
/// let engine = SearchEngine::new(storage, EngineConfig::default()).unwrap();
///
/// engine.add(&IndexKey::new("Product:1", "Product", "1"), "red widget").unwrap();
/// let results = engine.search("widget", &["Product"]).unwrap();
/// assert_eq!(results[0].key, "Product:1");
/// ```
pub struct SearchEngine {
    opener: IndexOpener,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("directory", self.opener.directory())
            .field("bulk_active", &self.state.lock().bulk_active())
            .finish()
    }
}

impl SearchEngine {
    /// Create an engine over `storage`.
    ///
    /// Nothing is read or written until the first operation. An index is
    /// created on the first write if the storage holds none.
    pub fn new(storage: Arc<dyn Storage>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let opener = IndexOpener::new(
            StorageDirectory::new(storage),
            Arc::new(DocumentMapper::new()),
            config,
        );
        Ok(Self {
            opener,
            state: Mutex::new(SessionState::default()),
        })
    }

    /// The storage this engine persists into.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        self.opener.directory().storage()
    }

    pub fn config(&self) -> &EngineConfig {
        self.opener.config()
    }

    /// Index `data` under `index_key`.
    ///
    /// Adding a key that is already indexed leaves two documents for it; use
    /// [`update`](Self::update) to replace.
    pub fn add(&self, index_key: &IndexKey, data: &str) -> Result<()> {
        let doc = self.opener.mapper().to_document(index_key, data);
        self.with_writer(|writer| {
            writer.add_document(doc)?;
            Ok(())
        })
    }

    /// Delete every document whose key equals `index_key.key`.
    pub fn remove(&self, index_key: &IndexKey) -> Result<()> {
        let term = self.opener.mapper().key_term(&index_key.key);
        self.with_writer(|writer| {
            writer.delete_term(term);
            Ok(())
        })
    }

    /// Replace the document for `index_key`.
    ///
    /// Runs [`remove`](Self::remove) then [`add`](Self::add). This is not
    /// atomic: if the add fails the key is left with no document.
    pub fn update(&self, index_key: &IndexKey, data: &str) -> Result<()> {
        self.remove(index_key)?;
        self.add(index_key, data)
    }

    /// Start a bulk session.
    ///
    /// Until [`end_bulk`](Self::end_bulk), writes share one writer and are not
    /// durable. A crash before `end_bulk` loses them. Only one bulk session
    /// may be active; a second call fails with
    /// [`SearchError::BulkSessionActive`].
    pub fn begin_bulk(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.bulk_active() {
            return Err(SearchError::BulkSessionActive);
        }
        let writer = self.opener.open_writer(&mut state)?;
        state.bulk_writer = Some(writer);
        log::debug!("bulk session started");
        Ok(())
    }

    /// Commit and close the bulk session. A no-op when none is active.
    pub fn end_bulk(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.create_new_index = false;
        let Some(writer) = state.bulk_writer.take() else {
            return Ok(());
        };
        session::release_writer(writer)?;
        log::info!("bulk session committed");
        Ok(())
    }

    /// Start a bulk session scoped to the returned guard.
    ///
    /// The session ends when [`BulkSession::finish`] is called or the guard
    /// is dropped.
    pub fn bulk(&self) -> Result<BulkSession<'_>> {
        self.begin_bulk()?;
        Ok(BulkSession {
            engine: self,
            finished: false,
        })
    }

    /// Whether a bulk session is active.
    pub fn bulk_active(&self) -> bool {
        self.state.lock().bulk_active()
    }

    /// Delete everything in the storage and leave an empty index behind.
    ///
    /// This is destructive and cannot be undone. An active bulk session is
    /// discarded without committing. Callers must not run other operations
    /// against the same storage concurrently.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.create_new_index = true;
        if let Some(writer) = state.bulk_writer.take() {
            log::warn!("clear discards the active bulk session");
            drop(writer);
        }

        let directory = self.opener.directory();
        let files = directory.list_all()?;
        let count = files.len();
        for name in files {
            directory.delete_file(&name)?;
        }

        let writer = self.opener.open_writer(&mut state)?;
        session::release_writer(writer)?;
        log::info!("cleared index ({count} files deleted)");
        Ok(())
    }

    /// Merge the index into as few segments as possible.
    ///
    /// Affects read performance only. Not allowed during a bulk session.
    pub fn optimize(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.bulk_active() {
            return Err(SearchError::BulkSessionActive);
        }
        let writer = self.opener.open_writer(&mut state)?;
        session::compact(writer)?;
        log::info!("optimized index");
        Ok(())
    }

    /// Search the payload text, returning at most
    /// [`EngineConfig::default_limit`] results.
    ///
    /// With no scopes every scope is searched; otherwise only documents in
    /// one of `scopes` match.
    pub fn search<S: AsRef<str>>(&self, query: &str, scopes: &[S]) -> Result<Vec<SearchResult>> {
        let request = SearchRequest {
            query: query.to_string(),
            scopes: scopes.iter().map(|s| s.as_ref().to_string()).collect(),
            limit: None,
            offset: 0,
        };
        self.search_with(&request)
    }

    /// Run a search request. Results are ordered by descending score.
    ///
    /// A request without a limit returns at most
    /// [`EngineConfig::default_limit`] results.
    ///
    /// Fails with [`SearchError::QuerySyntax`] for unparsable query text and
    /// with [`SearchError::IndexNotFound`] when the storage holds no index.
    pub fn search_with(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let (index, reader) = self.opener.open_reader()?;
        let searcher = reader.searcher();
        let mapper = self.opener.mapper();

        let query = QueryBuilder::new(&index, mapper).build(&request.query, &request.scopes)?;
        let limit = request.limit.unwrap_or(self.config().default_limit);
        let hits = search::execute(&searcher, query.as_ref(), limit, request.offset)?;
        search::extract_results(&searcher, mapper, hits)
    }

    /// Whether the storage holds an initialized index.
    pub fn index_exists(&self) -> Result<bool> {
        self.opener.index_exists()
    }

    /// Number of live documents in the last committed state.
    pub fn doc_count(&self) -> Result<u64> {
        let (_index, reader) = self.opener.open_reader()?;
        Ok(reader.searcher().num_docs())
    }

    /// Run `op` with the bulk writer, or with a single-operation writer that
    /// is committed and released before returning.
    fn with_writer<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut IndexWriter) -> Result<()>,
    {
        let mut state = self.state.lock();
        if let Some(writer) = state.bulk_writer.as_mut() {
            return op(writer);
        }
        let mut writer = self.opener.open_writer(&mut state)?;
        op(&mut writer)?;
        session::release_writer(writer)
    }
}

/// Guard for a bulk session started by [`SearchEngine::bulk`].
pub struct BulkSession<'a> {
    engine: &'a SearchEngine,
    finished: bool,
}

impl BulkSession<'_> {
    /// Add a document through the session's writer.
    pub fn add(&self, index_key: &IndexKey, data: &str) -> Result<()> {
        self.engine.add(index_key, data)
    }

    /// Commit and end the session.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.engine.end_bulk()
    }
}

impl Drop for BulkSession<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.engine.end_bulk() {
            log::warn!("failed to end bulk session on drop: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

    fn engine() -> SearchEngine {
        let storage = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
        SearchEngine::new(storage, EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchEngine>();
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let storage = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
        let config = EngineConfig::builder().default_limit(0).build();
        assert!(SearchEngine::new(storage, config).is_err());
    }

    #[test]
    fn test_new_performs_no_io() {
        let engine = engine();
        assert!(engine.storage().list_files().unwrap().is_empty());
    }

    #[test]
    fn test_end_bulk_resets_create_flag() {
        let engine = engine();
        engine.state.lock().create_new_index = true;
        engine.end_bulk().unwrap();
        assert!(!engine.state.lock().create_new_index);
    }

    #[test]
    fn test_dropped_guard_releases_writer() {
        let engine = engine();
        {
            let session = engine.bulk().unwrap();
            session.add(&IndexKey::new("k", "s", "1"), "apple").unwrap();
        }
        // A new writer can only be opened once the guard's writer is gone.
        engine.add(&IndexKey::new("k2", "s", "2"), "apple").unwrap();
        assert_eq!(engine.doc_count().unwrap(), 2);
    }
}
