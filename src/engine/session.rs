//! Writer lifecycle against the index engine.
//!
//! Writes run in one of two modes:
//!
//! - **single operation**: a writer is opened, used, committed and released
//!   within one call, so the change is durable when the call returns
//! - **bulk**: one writer is opened by `begin_bulk` and shared by every `add`
//!   until `end_bulk` commits and releases it
//!
//! The engine allows one writer per directory at a time, so while a bulk
//! session is open every write goes through its writer.

use std::sync::Arc;

use tantivy::{Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy};

use crate::analysis::ANALYZER_NAME;
use crate::engine::config::EngineConfig;
use crate::engine::document::DocumentMapper;
use crate::error::{Result, SearchError};
use crate::storage::directory::StorageDirectory;

/// Mutable session state, guarded by the engine's mutex.
#[derive(Default)]
pub(crate) struct SessionState {
    /// Writer shared by a bulk session, when one is active.
    pub(crate) bulk_writer: Option<IndexWriter>,
    /// Set by `clear`: the next writer open starts from an empty index.
    pub(crate) create_new_index: bool,
}

impl SessionState {
    pub(crate) fn bulk_active(&self) -> bool {
        self.bulk_writer.is_some()
    }
}

/// Opens indexes, readers and writers over one storage directory.
#[derive(Debug, Clone)]
pub(crate) struct IndexOpener {
    directory: StorageDirectory,
    mapper: Arc<DocumentMapper>,
    config: EngineConfig,
}

impl IndexOpener {
    pub(crate) fn new(
        directory: StorageDirectory,
        mapper: Arc<DocumentMapper>,
        config: EngineConfig,
    ) -> Self {
        Self {
            directory,
            mapper,
            config,
        }
    }

    pub(crate) fn directory(&self) -> &StorageDirectory {
        &self.directory
    }

    pub(crate) fn mapper(&self) -> &DocumentMapper {
        &self.mapper
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the directory holds an initialized index.
    pub(crate) fn index_exists(&self) -> Result<bool> {
        Index::exists(&self.directory).map_err(|e| SearchError::Engine(e.into()))
    }

    /// Open the existing index. Fails with `IndexNotFound` if there is none.
    pub(crate) fn open_index(&self) -> Result<Index> {
        if !self.index_exists()? {
            return Err(SearchError::index_not_found(
                "storage directory holds no initialized index",
            ));
        }
        let index = Index::open(self.directory.clone())?;
        self.mapper.check_compatible(&index.schema())?;
        self.register_analyzer(&index);
        Ok(index)
    }

    /// Replace whatever the directory holds with a new, empty index.
    pub(crate) fn create_index(&self) -> Result<Index> {
        for name in self.directory.list_all()? {
            self.directory.delete_file(&name)?;
        }
        let index = Index::create(
            self.directory.clone(),
            self.mapper.schema().clone(),
            IndexSettings::default(),
        )?;
        self.register_analyzer(&index);
        log::debug!("created empty index");
        Ok(index)
    }

    /// Open a writer.
    ///
    /// A fresh index is created first when `create_new_index` is set or when
    /// no index exists yet, so writes never fail because the index is absent.
    /// The flag is consumed once the fresh index exists.
    pub(crate) fn open_writer(&self, state: &mut SessionState) -> Result<IndexWriter> {
        let index = if state.create_new_index {
            let index = self.create_index()?;
            state.create_new_index = false;
            index
        } else if self.index_exists()? {
            self.open_index()?
        } else {
            log::debug!("no index in storage directory, creating one on first write");
            self.create_index()?
        };

        let writer: IndexWriter = index.writer_with_num_threads(
            self.config.writer_threads,
            self.config.writer_memory_budget,
        )?;
        log::debug!(
            "opened index writer ({} threads, {} bytes)",
            self.config.writer_threads,
            self.config.writer_memory_budget
        );
        Ok(writer)
    }

    /// Open a reader over the latest committed state of the index.
    pub(crate) fn open_reader(&self) -> Result<(Index, IndexReader)> {
        let index = self.open_index()?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        Ok((index, reader))
    }

    fn register_analyzer(&self, index: &Index) {
        index
            .tokenizers()
            .register(ANALYZER_NAME, self.config.analyzer.build());
    }
}

/// Commit the writer's pending changes and release it.
pub(crate) fn release_writer(mut writer: IndexWriter) -> Result<()> {
    writer.commit()?;
    writer.wait_merging_threads()?;
    Ok(())
}

/// Compact every searchable segment into one and drop obsolete files.
pub(crate) fn compact(mut writer: IndexWriter) -> Result<()> {
    let segment_ids = writer.index().searchable_segment_ids()?;
    if segment_ids.len() > 1 {
        log::debug!("merging {} segments", segment_ids.len());
        writer.merge(&segment_ids).wait()?;
    }
    writer.garbage_collect_files().wait()?;
    writer.commit()?;
    writer.wait_merging_threads()?;
    Ok(())
}
