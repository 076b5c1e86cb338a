//! Mapping from keyed payloads to index documents.
//!
//! Every document carries the same four fields:
//!
//! | field   | stored | exact match | tokenized |
//! |---------|--------|-------------|-----------|
//! | `key`   | yes    | yes         | no        |
//! | `scope` | yes    | yes         | no        |
//! | `id`    | yes    | yes         | no        |
//! | `data`  | no     | no          | yes       |
//!
//! The payload is only ever available through its tokens; callers keep the
//! source text elsewhere.

use serde::{Deserialize, Serialize};
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::{TantivyDocument, Term};

use crate::analysis::ANALYZER_NAME;
use crate::error::{Result, SearchError};

pub const KEY_FIELD: &str = "key";
pub const SCOPE_FIELD: &str = "scope";
pub const ID_FIELD: &str = "id";
pub const DATA_FIELD: &str = "data";

/// Identity of an indexed entity.
///
/// `key` must be unique within an index. Adding the same key twice without
/// removing it first leaves two documents; [`update`](super::SearchEngine::update)
/// removes before adding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexKey {
    pub key: String,
    pub scope: String,
    pub entity_id: String,
}

impl IndexKey {
    pub fn new(
        key: impl Into<String>,
        scope: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            scope: scope.into(),
            entity_id: entity_id.into(),
        }
    }
}

/// Builds index documents and lookup terms under the fixed field policy.
#[derive(Debug, Clone)]
pub struct DocumentMapper {
    schema: Schema,
    key: Field,
    scope: Field,
    id: Field,
    data: Field,
}

impl DocumentMapper {
    pub fn new() -> Self {
        let mut builder = Schema::builder();
        let key = builder.add_text_field(KEY_FIELD, STRING | STORED);
        let scope = builder.add_text_field(SCOPE_FIELD, STRING | STORED);
        let id = builder.add_text_field(ID_FIELD, STRING | STORED);

        let data_indexing = TextFieldIndexing::default()
            .set_tokenizer(ANALYZER_NAME)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let data = builder.add_text_field(
            DATA_FIELD,
            TextOptions::default().set_indexing_options(data_indexing),
        );

        Self {
            schema: builder.build(),
            key,
            scope,
            id,
            data,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn key_field(&self) -> Field {
        self.key
    }

    pub fn scope_field(&self) -> Field {
        self.scope
    }

    pub fn data_field(&self) -> Field {
        self.data
    }

    /// Build the document for `index_key` with `data` as the searchable payload.
    ///
    /// Empty payloads are accepted and contribute no terms.
    pub fn to_document(&self, index_key: &IndexKey, data: &str) -> TantivyDocument {
        let mut doc = TantivyDocument::default();
        doc.add_text(self.key, &index_key.key);
        doc.add_text(self.scope, &index_key.scope);
        doc.add_text(self.id, &index_key.entity_id);
        doc.add_text(self.data, data);
        doc
    }

    /// Exact-match term on the `key` field.
    pub fn key_term(&self, key: &str) -> Term {
        Term::from_field_text(self.key, key)
    }

    /// Exact-match term on the `scope` field.
    pub fn scope_term(&self, scope: &str) -> Term {
        Term::from_field_text(self.scope, scope)
    }

    /// Read the stored identity fields back from a retrieved document.
    pub fn to_index_key(&self, doc: &TantivyDocument) -> Result<IndexKey> {
        Ok(IndexKey {
            key: stored_text(doc, self.key, KEY_FIELD)?,
            scope: stored_text(doc, self.scope, SCOPE_FIELD)?,
            entity_id: stored_text(doc, self.id, ID_FIELD)?,
        })
    }

    /// Fail unless `schema` lays out the four fields the way this mapper does.
    pub fn check_compatible(&self, schema: &Schema) -> Result<()> {
        for (name, field) in [
            (KEY_FIELD, self.key),
            (SCOPE_FIELD, self.scope),
            (ID_FIELD, self.id),
            (DATA_FIELD, self.data),
        ] {
            let found = schema.get_field(name).map_err(|_| {
                SearchError::index_not_found(format!("index schema has no '{name}' field"))
            })?;
            if found != field
                || schema.get_field_entry(found).field_type()
                    != self.schema.get_field_entry(field).field_type()
            {
                return Err(SearchError::index_not_found(format!(
                    "index schema field '{name}' is incompatible"
                )));
            }
        }
        Ok(())
    }
}

impl Default for DocumentMapper {
    fn default() -> Self {
        Self::new()
    }
}

fn stored_text(doc: &TantivyDocument, field: Field, name: &str) -> Result<String> {
    doc.get_first(field)
        .and_then(|value| value.as_str())
        .map(str::to_string)
        .ok_or_else(|| SearchError::internal(format!("stored field '{name}' missing from hit")))
}
