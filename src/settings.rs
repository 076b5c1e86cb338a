//! Named configuration sources.
//!
//! The configured engine factory reads two settings by name: the storage
//! connection string and the container name. A [`SettingsSource`] decides
//! where those names are looked up.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{Result, SearchError};

/// Setting holding the blob storage connection string.
pub const BLOB_CONNECTION_STRING_KEY: &str = "LuceneBlobStorage";

/// Setting holding the blob container name.
pub const BLOB_CONTAINER_KEY: &str = "LuceneContainer";

/// A source of named string settings.
pub trait SettingsSource {
    /// Value of the named setting, if set.
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads settings from process environment variables.
///
/// With a prefix, the setting `LuceneContainer` is read from
/// `<prefix>LuceneContainer`.
#[derive(Debug, Clone, Default)]
pub struct EnvSettings {
    prefix: String,
}

impl EnvSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl SettingsSource for EnvSettings {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(format!("{}{name}", self.prefix)).ok()
    }
}

/// Settings held in memory.
#[derive(Debug, Clone, Default)]
pub struct MapSettings {
    values: HashMap<String, String>,
}

impl MapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl SettingsSource for MapSettings {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapSettings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Settings loaded from a flat JSON object of string values.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    values: HashMap<String, String>,
}

impl JsonFileSettings {
    /// Load settings from `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SearchError::storage(format!("read settings {}", path.display()), e))?;
        Self::from_json(&content)
    }

    /// Parse settings from a JSON string.
    pub fn from_json(content: &str) -> Result<Self> {
        let values: HashMap<String, String> = serde_json::from_str(content)
            .map_err(|e| SearchError::invalid_config(format!("settings file: {e}")))?;
        Ok(Self { values })
    }
}

impl SettingsSource for JsonFileSettings {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}
