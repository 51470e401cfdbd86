pub mod keyword;

use thiserror::Error;

use crate::context::ContextCollection;

pub use keyword::{KeywordEntry, KeywordSource, Query};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source initialization failed: {0}")]
    Initialization(String),
    #[error("Search failed: {0}")]
    Search(String),
    #[error("Cleanup failed: {0}")]
    Cleanup(String),
}

/// A retrieval backend the pipeline can fan a query out to.
///
/// `initialize` may be called before every search and must tolerate repeated
/// calls. `cleanup` must be safe to call more than once, including after a
/// failed `initialize`.
pub trait ContextSource {
    fn name(&self) -> &str;

    fn initialize(&mut self) -> Result<(), SourceError>;

    /// Return up to `limit` items for `query`, best first.
    fn search(&self, query: &str, limit: usize) -> Result<ContextCollection, SourceError>;

    fn cleanup(&mut self) -> Result<(), SourceError>;
}
