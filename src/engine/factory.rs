//! Engine construction from named settings.

use crate::engine::SearchEngine;
use crate::engine::config::EngineConfig;
use crate::error::{Result, SearchError};
use crate::settings::{BLOB_CONNECTION_STRING_KEY, BLOB_CONTAINER_KEY, SettingsSource};
use crate::storage::azure::{AzureStorageConfig, DEFAULT_CONTAINER_NAME, normalize_container_name};
use crate::storage::{StorageConfig, StorageFactory};

/// Resolve the blob storage settings from `source` into a [`StorageConfig`].
///
/// The connection string is required and must not be blank. The container
/// name falls back to [`DEFAULT_CONTAINER_NAME`] and is always lowercased.
pub fn resolve_storage_config(source: &dyn SettingsSource) -> Result<StorageConfig> {
    let connection_string = source
        .get(BLOB_CONNECTION_STRING_KEY)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| SearchError::configuration_missing(BLOB_CONNECTION_STRING_KEY))?;

    let container = source
        .get(BLOB_CONTAINER_KEY)
        .unwrap_or_else(|| DEFAULT_CONTAINER_NAME.to_string());

    Ok(StorageConfig::Azure(
        AzureStorageConfig::new(connection_string)
            .with_container(normalize_container_name(&container)),
    ))
}

impl SearchEngine {
    /// Build an engine over the blob container named by `source`.
    ///
    /// Fails with [`SearchError::ConfigurationMissing`] when the connection
    /// string is absent or blank, and with [`SearchError::ConfigurationInvalid`]
    /// when it cannot be parsed. The container is not contacted.
    pub fn from_settings(source: &dyn SettingsSource) -> Result<Self> {
        Self::from_settings_with_config(source, EngineConfig::default())
    }

    /// Like [`from_settings`](Self::from_settings) with an explicit engine configuration.
    pub fn from_settings_with_config(
        source: &dyn SettingsSource,
        config: EngineConfig,
    ) -> Result<Self> {
        let storage_config = resolve_storage_config(source)?;
        let storage = StorageFactory::create(storage_config)?;
        Self::new(storage, config)
    }
}
