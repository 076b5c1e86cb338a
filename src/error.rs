//! Error types for the scoped search layer.
//!
//! Every failure surfaces to the caller. The variants are grouped so callers
//! can tell configuration problems (fix the deployment) from query problems
//! (fix the input) from index-state problems (re-provision storage).

use std::io;

use thiserror::Error;

/// The main error type.
#[derive(Error, Debug)]
pub enum SearchError {
    /// A required configuration setting is absent or blank.
    #[error("Configuration value '{key}' is missing or empty")]
    ConfigurationMissing { key: String },

    /// A configuration setting is present but cannot be interpreted.
    #[error("Invalid configuration: {message}")]
    ConfigurationInvalid { message: String },

    /// The query text could not be parsed.
    #[error("Query syntax error: {0}")]
    QuerySyntax(String),

    /// The storage directory holds no initialized index.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// `begin_bulk` was called while a bulk session was already open.
    #[error("A bulk session is already active")]
    BulkSessionActive,

    /// I/O failure in the storage medium.
    #[error("Storage error: {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Failure reported by the inverted-index engine.
    #[error("Index engine error: {0}")]
    Engine(#[from] tantivy::TantivyError),

    /// Invalid argument supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal invariant violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for operations that may fail with [`SearchError`].
pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Create a missing-configuration error for the named setting.
    pub fn configuration_missing<S: Into<String>>(key: S) -> Self {
        SearchError::ConfigurationMissing { key: key.into() }
    }

    /// Create an invalid-configuration error.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        SearchError::ConfigurationInvalid {
            message: message.into(),
        }
    }

    /// Create a query syntax error.
    pub fn query_syntax<S: Into<String>>(msg: S) -> Self {
        SearchError::QuerySyntax(msg.into())
    }

    /// Create an index-not-found error.
    pub fn index_not_found<S: Into<String>>(msg: S) -> Self {
        SearchError::IndexNotFound(msg.into())
    }

    /// Wrap an I/O error with a short description of what was being done.
    pub fn storage<S: Into<String>>(context: S, source: io::Error) -> Self {
        SearchError::Storage {
            context: context.into(),
            source,
        }
    }

    /// Create a not-found storage error for `operation` on the named blob.
    pub fn file_not_found(operation: &str, name: &str) -> Self {
        SearchError::storage(
            format!("{operation} '{name}'"),
            io::Error::new(io::ErrorKind::NotFound, "file does not exist"),
        )
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        SearchError::InvalidArgument(msg.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        SearchError::Internal(msg.into())
    }

    /// True for errors raised while resolving configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SearchError::ConfigurationMissing { .. } | SearchError::ConfigurationInvalid { .. }
        )
    }

    /// True for errors caused by the caller's query input.
    pub fn is_query_error(&self) -> bool {
        matches!(self, SearchError::QuerySyntax(_))
    }

    /// True for errors caused by the state of the index or its storage.
    pub fn is_index_state_error(&self) -> bool {
        matches!(self, SearchError::IndexNotFound(_))
    }

    /// True when the error is a storage error for a blob that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SearchError::Storage { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }
}

impl From<io::Error> for SearchError {
    fn from(err: io::Error) -> Self {
        SearchError::storage("I/O", err)
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::invalid_config(format!("JSON: {err}"))
    }
}

impl From<tantivy::query::QueryParserError> for SearchError {
    fn from(err: tantivy::query::QueryParserError) -> Self {
        SearchError::QuerySyntax(err.to_string())
    }
}

impl From<SearchError> for io::Error {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Storage { source, .. } => source,
            other => io::Error::other(other.to_string()),
        }
    }
}
