use serde::{Deserialize, Serialize};
use tantivy::collector::TopDocs;
use tantivy::query::Query;
use tantivy::{DocAddress, Score, Searcher, TantivyDocument};

use crate::engine::document::{DocumentMapper, IndexKey};
use crate::error::{Result, SearchError};

/// A free-text search, optionally restricted to scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text, parsed against the payload field.
    pub query: String,
    /// Scopes to search in. Empty means every scope.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Maximum number of results to return. `None` uses the engine's
    /// [`default_limit`](crate::EngineConfig::default_limit).
    #[serde(default)]
    pub limit: Option<usize>,
    /// Number of top-ranked results to skip (for pagination).
    #[serde(default)]
    pub offset: usize,
}

impl SearchRequest {
    pub fn builder(query: impl Into<String>) -> SearchRequestBuilder {
        SearchRequestBuilder::new(query)
    }
}

pub struct SearchRequestBuilder {
    request: SearchRequest,
}

impl SearchRequestBuilder {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            request: SearchRequest {
                query: query.into(),
                scopes: Vec::new(),
                limit: None,
                offset: 0,
            },
        }
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.request.scopes.push(scope.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.request.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.request.offset = offset;
        self
    }

    pub fn build(self) -> SearchRequest {
        self.request
    }
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub key: String,
    pub scope: String,
    pub entity_id: String,
    /// Relevance assigned by the index engine. Not comparable across queries.
    pub score: f32,
}

impl SearchResult {
    fn new(index_key: IndexKey, score: Score) -> Self {
        Self {
            key: index_key.key,
            scope: index_key.scope,
            entity_id: index_key.entity_id,
            score,
        }
    }

    /// The identity of the matched entity.
    pub fn index_key(&self) -> IndexKey {
        IndexKey::new(&self.key, &self.scope, &self.entity_id)
    }
}

/// Run `query` and collect the ranked hits selected by `limit` and `offset`.
pub(crate) fn execute(
    searcher: &Searcher,
    query: &dyn Query,
    limit: usize,
    offset: usize,
) -> Result<Vec<(Score, DocAddress)>> {
    if limit == 0 {
        return Err(SearchError::invalid_argument("limit must be at least 1"));
    }
    let collector = TopDocs::with_limit(limit).and_offset(offset);
    Ok(searcher.search(query, &collector)?)
}

/// Turn ranked hits into results carrying the stored identity fields.
pub(crate) fn extract_results(
    searcher: &Searcher,
    mapper: &DocumentMapper,
    hits: Vec<(Score, DocAddress)>,
) -> Result<Vec<SearchResult>> {
    hits.into_iter()
        .map(|(score, address)| {
            let doc: TantivyDocument = searcher.doc(address)?;
            Ok(SearchResult::new(mapper.to_index_key(&doc)?, score))
        })
        .collect()
}
