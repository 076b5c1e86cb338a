//! Text analysis for the searchable payload field.
//!
//! The same analyzer is used when documents are indexed and when query text
//! is parsed, so both sides agree on what a term is.

use serde::{Deserialize, Serialize};
use tantivy::tokenizer::{
    LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer,
};

/// Name under which the analyzer is registered with each opened index.
pub const ANALYZER_NAME: &str = "scoped_search";

/// Classic English stop list applied by standard analyzers.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Analyzer options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Terms dropped from both documents and queries. Compared after lowercasing.
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,
    /// Tokens of this many bytes or more are discarded.
    #[serde(default = "default_max_token_length")]
    pub max_token_length: usize,
}

fn default_stop_words() -> Vec<String> {
    ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect()
}

fn default_max_token_length() -> usize {
    255
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            stop_words: default_stop_words(),
            max_token_length: default_max_token_length(),
        }
    }
}

impl AnalyzerConfig {
    /// Analyzer that keeps every token.
    pub fn without_stop_words() -> Self {
        Self {
            stop_words: Vec::new(),
            ..Default::default()
        }
    }

    /// Analyzer with a custom stop list.
    pub fn with_stop_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stop_words: words.into_iter().map(|w| w.into().to_lowercase()).collect(),
            ..Default::default()
        }
    }

    pub fn max_token_length(mut self, max_token_length: usize) -> Self {
        self.max_token_length = max_token_length;
        self
    }

    /// Build the analyzer pipeline.
    pub fn build(&self) -> TextAnalyzer {
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(self.max_token_length))
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(self.stop_words.iter().cloned()))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::tokenizer::TokenStream;

    fn analyze(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
        let mut stream = analyzer.token_stream(text);
        let mut terms = Vec::new();
        while stream.advance() {
            terms.push(stream.token().text.clone());
        }
        terms
    }

    #[test]
    fn test_default_analyzer() {
        let mut analyzer = AnalyzerConfig::default().build();
        assert_eq!(
            analyze(&mut analyzer, "The Quick brown FOX and the dog"),
            vec!["quick", "brown", "fox", "dog"]
        );
    }

    #[test]
    fn test_without_stop_words() {
        let mut analyzer = AnalyzerConfig::without_stop_words().build();
        assert_eq!(analyze(&mut analyzer, "The end"), vec!["the", "end"]);
    }

    #[test]
    fn test_custom_stop_words() {
        let mut analyzer = AnalyzerConfig::with_stop_words(["Lorem"]).build();
        assert_eq!(analyze(&mut analyzer, "lorem ipsum the"), vec!["ipsum", "the"]);
    }

    #[test]
    fn test_long_tokens_removed() {
        let mut analyzer = AnalyzerConfig::without_stop_words()
            .max_token_length(5)
            .build();
        assert_eq!(analyze(&mut analyzer, "tiny enormous"), vec!["tiny"]);
    }
}
