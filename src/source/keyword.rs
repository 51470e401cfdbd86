use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use super::{ContextSource, SourceError};
use crate::context::{ContextCollection, ContextItem, Metadata};

/// A normalized keyword query.
/// Normalization rules:
/// - Lowercase
/// - Split on whitespace
/// - Empty queries match nothing
#[derive(Debug, Clone)]
pub struct Query {
    pub raw: String,
    pub terms: Vec<String>,
}

impl Query {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let terms = raw
            .to_lowercase()
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();

        Self { raw, terms }
    }
}

/// One indexed text with its annotations.
#[derive(Debug, Clone)]
pub struct KeywordEntry {
    pub content: String,
    pub metadata: Metadata,
}

impl KeywordEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Static in-memory keyword index.
///
/// `initialize` builds an inverted index over the lowercased words of every
/// entry; `cleanup` drops it. An entry scores `term_matches / total_words`,
/// so scores fall in `[0.0, 1.0]`.
pub struct KeywordSource {
    name: String,
    entries: Vec<KeywordEntry>,
    index: Option<BTreeMap<String, BTreeSet<usize>>>,
}

impl KeywordSource {
    pub fn new(name: impl Into<String>, entries: Vec<KeywordEntry>) -> Self {
        Self {
            name: name.into(),
            entries,
            index: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.index.is_some()
    }

    fn score(&self, entry: &KeywordEntry, query: &Query) -> f64 {
        // total_words is split(content, whitespace).len() after lowercasing.
        let content_lower = entry.content.to_lowercase();
        let words: Vec<&str> = content_lower.split_whitespace().collect();
        let total_words = words.len();

        if total_words == 0 || query.terms.is_empty() {
            return 0.0;
        }

        // Naive count: occurrences of ANY query term
        let term_matches = words
            .iter()
            .filter(|word| query.terms.iter().any(|term| term == *word))
            .count();

        let score = term_matches as f64 / total_words as f64;
        debug_assert!((0.0..=1.0).contains(&score), "score {score} out of range [0.0, 1.0]");
        score
    }
}

impl ContextSource for KeywordSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<(), SourceError> {
        if self.index.is_some() {
            return Ok(());
        }

        let mut index: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
        for (position, entry) in self.entries.iter().enumerate() {
            for word in entry.content.to_lowercase().split_whitespace() {
                index.entry(word.to_string()).or_default().insert(position);
            }
        }

        tracing::debug!(source = %self.name, terms = index.len(), "keyword index built");
        self.index = Some(index);
        Ok(())
    }

    fn search(&self, query: &str, limit: usize) -> Result<ContextCollection, SourceError> {
        let index = self.index.as_ref().ok_or_else(|| {
            SourceError::Search(format!("keyword source '{}' is not initialized", self.name))
        })?;

        let query = Query::new(query);
        let candidates: BTreeSet<usize> = query
            .terms
            .iter()
            .filter_map(|term| index.get(term))
            .flatten()
            .copied()
            .collect();

        let mut scored: Vec<(usize, f64)> = candidates
            .into_iter()
            .map(|position| (position, self.score(&self.entries[position], &query)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // Sort by (score desc, position asc)
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(position, score)| {
                let entry = &self.entries[position];
                ContextItem::new(entry.content.clone(), score, self.name.clone())
                    .with_metadata_map(entry.metadata.clone())
            })
            .collect())
    }

    fn cleanup(&mut self) -> Result<(), SourceError> {
        self.index = None;
        Ok(())
    }
}
