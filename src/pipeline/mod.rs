use thiserror::Error;

use crate::context::ContextCollection;
use crate::source::{ContextSource, SourceError};
use crate::tokenizer::{Tokenizer, TokenizerError};

/// How the pipeline post-processes merged results.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub deduplicate: bool,
    pub rerank: bool,
    /// Each source is asked for `ceil(limit * over_fetch_factor)` items so
    /// deduplication losses do not starve the final limit.
    pub over_fetch_factor: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deduplicate: true,
            rerank: true,
            over_fetch_factor: 1.5,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Context source '{name}' failed: {error}")]
    Source {
        name: String,
        #[source]
        error: SourceError,
    },
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
}

impl PipelineError {
    fn failed(name: &str, error: SourceError) -> Self {
        PipelineError::Source {
            name: name.to_string(),
            error,
        }
    }
}

/// Fans a query out to every registered source and merges the answers.
///
/// Sources are queried sequentially in registration order, so when two
/// sources return the same content with the same score the earlier source
/// wins deduplication. Any source failure aborts the whole search.
#[derive(Default)]
pub struct ContextPipeline {
    sources: Vec<Box<dyn ContextSource>>,
    config: PipelineConfig,
}

impl ContextPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            sources: Vec::new(),
            config,
        }
    }

    pub fn add_source(&mut self, source: impl ContextSource + 'static) -> &mut Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn with_source(mut self, source: impl ContextSource + 'static) -> Self {
        self.add_source(source);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Per-source request size for a final `limit`.
    pub fn per_source_limit(&self, limit: usize) -> usize {
        (limit as f64 * self.config.over_fetch_factor).ceil() as usize
    }

    pub fn search(
        &mut self,
        query: &str,
        limit: usize,
    ) -> Result<ContextCollection, PipelineError> {
        if self.sources.is_empty() {
            return Ok(ContextCollection::new());
        }

        for source in &mut self.sources {
            source
                .initialize()
                .map_err(|e| PipelineError::failed(source.name(), e))?;
        }

        let per_source_limit = self.per_source_limit(limit);
        let mut merged = ContextCollection::new();

        for source in &self.sources {
            let found = source
                .search(query, per_source_limit)
                .map_err(|e| PipelineError::failed(source.name(), e))?;
            tracing::debug!(source = source.name(), items = found.len(), "source searched");
            merged.merge(found);
        }

        let fetched = merged.len();
        if self.config.deduplicate {
            merged = merged.deduplicate();
        }
        if self.config.rerank {
            merged = merged.rerank();
        }
        let result = merged.limit(limit);

        tracing::debug!(
            sources = self.sources.len(),
            fetched,
            returned = result.len(),
            limit,
            "context pipeline search complete"
        );

        Ok(result)
    }

    /// [`search`](Self::search), then cut the ranked result to `max_tokens`.
    pub fn search_within_tokens(
        &mut self,
        query: &str,
        limit: usize,
        max_tokens: usize,
        model: &str,
        tokenizer: &dyn Tokenizer,
    ) -> Result<ContextCollection, PipelineError> {
        let collection = self.search(query, limit)?;
        Ok(collection.truncate_to_tokens(max_tokens, model, tokenizer)?)
    }

    /// Clean up every source. Keeps going past failures and reports the first.
    pub fn cleanup(&mut self) -> Result<(), PipelineError> {
        let mut first_error = None;

        for source in &mut self.sources {
            if let Err(e) = source.cleanup() {
                tracing::warn!(source = source.name(), error = %e, "context source cleanup failed");
                if first_error.is_none() {
                    first_error = Some(PipelineError::failed(source.name(), e));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
