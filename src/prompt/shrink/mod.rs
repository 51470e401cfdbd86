pub mod compress;
pub mod truncate;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::tokenizer::{Tokenizer, TokenizerError};

pub use compress::CompressShrinker;
pub use truncate::TruncateShrinker;

/// Registry name of [`TruncateShrinker`].
pub const TRUNCATE: &str = "truncate";
/// Registry name of [`CompressShrinker`].
pub const COMPRESS: &str = "compress";

/// A strategy that reduces text toward a token target.
///
/// Contract:
/// - `target_tokens == 0` yields `""`
/// - content already within the target is returned unchanged
/// - otherwise the result measures at most `target_tokens` whenever the
///   strategy can reach it
pub trait Shrinker: Send + Sync {
    fn shrink(
        &self,
        content: &str,
        target_tokens: usize,
        model: &str,
        tokenizer: &dyn Tokenizer,
    ) -> Result<String, TokenizerError>;
}

/// Named shrinking strategies. `truncate` and `compress` are always present.
#[derive(Clone)]
pub struct ShrinkerRegistry {
    shrinkers: BTreeMap<String, Arc<dyn Shrinker>>,
}

impl Default for ShrinkerRegistry {
    fn default() -> Self {
        let mut registry = Self {
            shrinkers: BTreeMap::new(),
        };
        registry.register(TRUNCATE, TruncateShrinker::default());
        registry.register(COMPRESS, CompressShrinker);
        registry
    }
}

impl ShrinkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy, replacing any existing one with the same name.
    pub fn register(&mut self, name: impl Into<String>, shrinker: impl Shrinker + 'static) {
        self.shrinkers.insert(name.into(), Arc::new(shrinker));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Shrinker>> {
        self.shrinkers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.shrinkers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.shrinkers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ShrinkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.shrinkers.keys()).finish()
    }
}

/// Join `pieces` with `separator` for as long as the joined text stays
/// within `target_tokens`, re-measuring the whole accumulation each time.
/// Stops at the first piece that would overflow.
pub(crate) fn accumulate_within(
    pieces: &[&str],
    separator: &str,
    target_tokens: usize,
    model: &str,
    tokenizer: &dyn Tokenizer,
) -> Result<String, TokenizerError> {
    let mut accumulated = String::new();

    for piece in pieces {
        let candidate = if accumulated.is_empty() {
            piece.to_string()
        } else {
            format!("{accumulated}{separator}{piece}")
        };

        if tokenizer.count(&candidate, model)? > target_tokens {
            break;
        }
        accumulated = candidate;
    }

    Ok(accumulated)
}

/// Word-level greedy truncation, splitting on single spaces.
pub(crate) fn truncate_words(
    content: &str,
    target_tokens: usize,
    model: &str,
    tokenizer: &dyn Tokenizer,
) -> Result<String, TokenizerError> {
    let words: Vec<&str> = content.split(' ').collect();
    accumulate_within(&words, " ", target_tokens, model, tokenizer)
}
