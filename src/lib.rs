//! # Scoped Search
//!
//! Keyed full-text indexing over local or cloud blob storage.
//!
//! ## Features
//!
//! - Index payload text under a key, scope and entity id
//! - Free-text search restricted to one or more scopes
//! - Single-operation and bulk write sessions
//! - Pluggable storage backends (memory, local directory, Azure blob container)
//! - Engine construction from named settings

// Core modules
pub mod analysis;
pub mod engine;
mod error;
pub mod settings;
pub mod storage;

// Re-exports for the public API
pub use analysis::AnalyzerConfig;
pub use engine::config::{EngineConfig, EngineConfigBuilder};
pub use engine::document::IndexKey;
pub use engine::factory::resolve_storage_config;
pub use engine::search::{SearchRequest, SearchRequestBuilder, SearchResult};
pub use engine::{BulkSession, SearchEngine};
pub use error::{Result, SearchError};
pub use settings::{EnvSettings, JsonFileSettings, MapSettings, SettingsSource};
pub use storage::{Storage, StorageConfig, StorageFactory};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
