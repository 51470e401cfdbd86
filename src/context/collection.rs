use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::format::{self, PromptFormat};
use super::item::ContextItem;
use crate::prompt::section::Section;
use crate::prompt::shrink::TRUNCATE;
use crate::tokenizer::{Tokenizer, TokenizerError};
use crate::types::identifiers::ContentHash;

/// A partially fitting item is only worth keeping above this many tokens.
pub const MIN_PARTIAL_TOKENS: usize = 50;

/// An ordered run of context items. Position is rank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextCollection {
    items: Vec<ContextItem>,
}

impl ContextCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[ContextItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContextItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: ContextItem) {
        self.items.push(item);
    }

    /// Append another collection, keeping both orders.
    pub fn merge(&mut self, other: ContextCollection) {
        self.items.extend(other.items);
    }

    /// Keep only the first `limit` items.
    pub fn limit(mut self, limit: usize) -> Self {
        self.items.truncate(limit);
        self
    }

    /// Collapse items with identical content to the best-scoring one.
    ///
    /// Groups keep the position of their first occurrence; within a group the
    /// highest score wins and ties go to the earliest item.
    pub fn deduplicate(self) -> Self {
        let mut slots: HashMap<ContentHash, usize> = HashMap::with_capacity(self.items.len());
        let mut kept: Vec<ContextItem> = Vec::with_capacity(self.items.len());

        for item in self.items {
            let hash = item.content_hash();
            match slots.get(&hash) {
                Some(&slot) => {
                    if item.score() > kept[slot].score() {
                        kept[slot] = item;
                    }
                }
                None => {
                    slots.insert(hash, kept.len());
                    kept.push(item);
                }
            }
        }

        Self { items: kept }
    }

    /// Stable sort by score, highest first.
    pub fn rerank(mut self) -> Self {
        self.items.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(Ordering::Equal)
        });
        self
    }

    /// Keep the longest prefix that fits in `max_tokens`.
    ///
    /// The first item that does not fit is cut down to the remaining budget
    /// when more than [`MIN_PARTIAL_TOKENS`] are left, and flagged with
    /// `truncated` and `original_length` metadata. Nothing after it is kept.
    pub fn truncate_to_tokens(
        self,
        max_tokens: usize,
        model: &str,
        tokenizer: &dyn Tokenizer,
    ) -> Result<Self, TokenizerError> {
        let mut kept = Vec::new();
        let mut used = 0usize;

        for item in self.items {
            let tokens = tokenizer.count(item.content(), model)?;
            if used + tokens <= max_tokens {
                used += tokens;
                kept.push(item);
                continue;
            }

            let remaining = max_tokens - used;
            if remaining > MIN_PARTIAL_TOKENS {
                if let Some(partial) = cut_to_tokens(item.content(), remaining, model, tokenizer)? {
                    let original_length = item.content().chars().count();
                    tracing::debug!(
                        source = item.source(),
                        remaining,
                        original_length,
                        "truncating overflowing context item"
                    );
                    kept.push(
                        item.with_content(partial)
                            .with_metadata("truncated", true)
                            .with_metadata("original_length", original_length),
                    );
                }
            }
            break;
        }

        Ok(Self { items: kept })
    }

    pub fn format_for_prompt(&self, format: PromptFormat) -> String {
        format::render(&self.items, format)
    }

    /// Sum of per-item token counts.
    pub fn total_tokens(
        &self,
        model: &str,
        tokenizer: &dyn Tokenizer,
    ) -> Result<usize, TokenizerError> {
        self.items
            .iter()
            .map(|item| tokenizer.count(item.content(), model))
            .sum()
    }

    /// Render the collection into a prompt section that the composer may
    /// shrink with the `truncate` strategy.
    pub fn into_section(
        self,
        name: impl Into<String>,
        priority: i32,
        format: PromptFormat,
    ) -> Section {
        let item_count = self.items.len();
        Section::text(name, self.format_for_prompt(format))
            .with_priority(priority)
            .with_shrinker(TRUNCATE)
            .with_metadata("item_count", item_count)
    }
}

/// Decode the first `budget` tokens of `content`. Re-encoding decoded text can
/// merge differently at the cut, so the slice shrinks until the result
/// measures within budget.
fn cut_to_tokens(
    content: &str,
    budget: usize,
    model: &str,
    tokenizer: &dyn Tokenizer,
) -> Result<Option<String>, TokenizerError> {
    let tokens = tokenizer.encode(content, model)?;
    let mut take = budget.min(tokens.len());

    while take > 0 {
        let text = tokenizer.decode(&tokens[..take], model)?;
        let measured = tokenizer.count(&text, model)?;
        if measured <= budget {
            return Ok((!text.is_empty()).then_some(text));
        }
        take -= (measured - budget).min(take);
    }

    Ok(None)
}

impl IntoIterator for ContextCollection {
    type Item = ContextItem;
    type IntoIter = std::vec::IntoIter<ContextItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ContextCollection {
    type Item = &'a ContextItem;
    type IntoIter = std::slice::Iter<'a, ContextItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<ContextItem> for ContextCollection {
    fn from_iter<I: IntoIterator<Item = ContextItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl Extend<ContextItem> for ContextCollection {
    fn extend<I: IntoIterator<Item = ContextItem>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl From<Vec<ContextItem>> for ContextCollection {
    fn from(items: Vec<ContextItem>) -> Self {
        Self { items }
    }
}
