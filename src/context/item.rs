use serde::{Deserialize, Serialize};

use super::metadata::{Metadata, MetadataValue};
use crate::types::identifiers::ContentHash;

/// A scored, sourced piece of retrieved text.
///
/// Items are values: the `with_*` methods consume the item and return a
/// modified copy, nothing mutates an item in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    content: String,
    score: f64,
    source: String,
    #[serde(default)]
    metadata: Metadata,
}

impl ContextItem {
    pub fn new(content: impl Into<String>, score: f64, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            score,
            source: source.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of(&self.content)
    }

    pub fn with_score(self, score: f64) -> Self {
        Self { score, ..self }
    }

    pub fn with_content(self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..self
        }
    }

    /// Set one metadata key, overriding any existing value.
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Merge a whole metadata map, overriding common keys.
    pub fn with_metadata_map(mut self, metadata: Metadata) -> Self {
        self.metadata.merge(metadata);
        self
    }
}
