use serde::{Deserialize, Serialize};

use crate::analysis::AnalyzerConfig;
use crate::error::{Result, SearchError};

/// Smallest writer memory budget the index engine accepts per indexing thread.
pub const MIN_WRITER_MEMORY_PER_THREAD: usize = 15_000_000;

/// Configuration for [`SearchEngine`](super::SearchEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Analyzer applied to payload text and query text.
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    /// Total heap budget of a writer, in bytes.
    #[serde(default = "default_writer_memory_budget")]
    pub writer_memory_budget: usize,
    /// Number of indexing threads per writer.
    #[serde(default = "default_writer_threads")]
    pub writer_threads: usize,
    /// Number of results returned by [`SearchEngine::search`](super::SearchEngine::search).
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

fn default_writer_memory_budget() -> usize {
    50_000_000
}

fn default_writer_threads() -> usize {
    1
}

fn default_limit() -> usize {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analyzer: AnalyzerConfig::default(),
            writer_memory_budget: default_writer_memory_budget(),
            writer_threads: default_writer_threads(),
            default_limit: default_limit(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Check the values the index engine would otherwise reject at writer open.
    pub fn validate(&self) -> Result<()> {
        if self.writer_threads == 0 {
            return Err(SearchError::invalid_config(
                "writer_threads must be at least 1",
            ));
        }
        if self.writer_memory_budget / self.writer_threads < MIN_WRITER_MEMORY_PER_THREAD {
            return Err(SearchError::invalid_config(format!(
                "writer_memory_budget must be at least {MIN_WRITER_MEMORY_PER_THREAD} bytes per writer thread"
            )));
        }
        if self.default_limit == 0 {
            return Err(SearchError::invalid_config(
                "default_limit must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.config.analyzer = analyzer;
        self
    }

    pub fn stop_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let max_token_length = self.config.analyzer.max_token_length;
        self.config.analyzer =
            AnalyzerConfig::with_stop_words(words).max_token_length(max_token_length);
        self
    }

    pub fn writer_memory_budget(mut self, bytes: usize) -> Self {
        self.config.writer_memory_budget = bytes;
        self
    }

    pub fn writer_threads(mut self, threads: usize) -> Self {
        self.config.writer_threads = threads;
        self
    }

    pub fn default_limit(mut self, limit: usize) -> Self {
        self.config.default_limit = limit;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_limit, 1);
    }

    #[test]
    fn test_validate_rejects_small_budget() {
        let config = EngineConfig::builder()
            .writer_threads(4)
            .writer_memory_budget(20_000_000)
            .build();
        assert!(config.validate().unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let config = EngineConfig::builder().default_limit(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig = serde_json::from_str(r#"{"default_limit": 10}"#).unwrap();
        assert_eq!(config.default_limit, 10);
        assert_eq!(config.writer_threads, 1);
        assert_eq!(config.analyzer, AnalyzerConfig::default());
    }
}
