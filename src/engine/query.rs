//! Query construction.
//!
//! Free text is parsed against the tokenized `data` field. Scopes become a
//! disjunction of exact `scope` terms that restricts the matches without
//! contributing to their scores.

use tantivy::Index;
use tantivy::query::{BooleanQuery, ConstScoreQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::IndexRecordOption;

use crate::engine::document::DocumentMapper;
use crate::error::{Result, SearchError};

/// Builds engine queries for one opened index.
pub struct QueryBuilder<'a> {
    parser: QueryParser,
    mapper: &'a DocumentMapper,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(index: &Index, mapper: &'a DocumentMapper) -> Self {
        let parser = QueryParser::for_index(index, vec![mapper.data_field()]);
        Self { parser, mapper }
    }

    /// Parse free text into a ranked query over the payload field.
    pub fn parse_text(&self, query_text: &str) -> Result<Box<dyn Query>> {
        if query_text.trim().is_empty() {
            return Err(SearchError::query_syntax("query text is empty"));
        }
        Ok(self.parser.parse_query(query_text)?)
    }

    /// OR of exact-match scope terms, or `None` when no scope is given.
    pub fn scope_filter<S: AsRef<str>>(&self, scopes: &[S]) -> Option<Box<dyn Query>> {
        if scopes.is_empty() {
            return None;
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = scopes
            .iter()
            .map(|scope| {
                let term = self.mapper.scope_term(scope.as_ref());
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::Basic));
                (Occur::Should, query)
            })
            .collect();

        Some(Box::new(ConstScoreQuery::new(
            Box::new(BooleanQuery::new(clauses)),
            0.0,
        )))
    }

    /// Free-text query restricted to `scopes` when any are given.
    pub fn build<S: AsRef<str>>(&self, query_text: &str, scopes: &[S]) -> Result<Box<dyn Query>> {
        let text_query = self.parse_text(query_text)?;
        match self.scope_filter(scopes) {
            None => Ok(text_query),
            Some(filter) => Ok(Box::new(BooleanQuery::new(vec![
                (Occur::Must, text_query),
                (Occur::Must, filter),
            ]))),
        }
    }
}
