use std::ops::Range;

use super::{truncate_words, Shrinker};
use crate::tokenizer::{Tokenizer, TokenizerError};

/// Cuts content down to whole sentences, or whole words.
#[derive(Debug, Clone, Copy)]
pub struct TruncateShrinker {
    pub sentence_aware: bool,
}

impl Default for TruncateShrinker {
    fn default() -> Self {
        Self {
            sentence_aware: true,
        }
    }
}

impl TruncateShrinker {
    pub fn words_only() -> Self {
        Self {
            sentence_aware: false,
        }
    }
}

impl Shrinker for TruncateShrinker {
    fn shrink(
        &self,
        content: &str,
        target_tokens: usize,
        model: &str,
        tokenizer: &dyn Tokenizer,
    ) -> Result<String, TokenizerError> {
        if target_tokens == 0 {
            return Ok(String::new());
        }
        if tokenizer.count(content, model)? <= target_tokens {
            return Ok(content.to_string());
        }

        if self.sentence_aware {
            let kept = leading_sentences(content, target_tokens, model, tokenizer)?;
            if !kept.is_empty() {
                return Ok(kept.to_string());
            }
        }

        truncate_words(content, target_tokens, model, tokenizer)
    }
}

/// The longest run of whole leading sentences within `target_tokens`, sliced
/// from `content` so the separators between them are kept as written.
fn leading_sentences<'a>(
    content: &'a str,
    target_tokens: usize,
    model: &str,
    tokenizer: &dyn Tokenizer,
) -> Result<&'a str, TokenizerError> {
    let spans = sentence_spans(content);
    let Some(first) = spans.first() else {
        return Ok("");
    };

    let mut kept = "";
    for span in &spans {
        let candidate = &content[first.start..span.end];
        if tokenizer.count(candidate, model)? > target_tokens {
            break;
        }
        kept = candidate;
    }
    Ok(kept)
}

/// Byte ranges of the sentences in `content`. A sentence ends after `.`, `!`
/// or `?` when followed by whitespace; ranges exclude surrounding whitespace.
fn sentence_spans(content: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = content.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(_, next_c)) = chars.peek() else {
            continue;
        };
        if !next_c.is_whitespace() {
            continue;
        }

        push_trimmed(content, start..i + c.len_utf8(), &mut spans);

        // Skip the whitespace run.
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            chars.next();
            start = j + w.len_utf8();
        }
    }

    push_trimmed(content, start..content.len(), &mut spans);
    spans
}

fn push_trimmed(content: &str, span: Range<usize>, spans: &mut Vec<Range<usize>>) {
    let text = &content[span.clone()];
    let start = span.start + (text.len() - text.trim_start().len());
    let end = span.start + text.trim_end().len();
    if start < end {
        spans.push(start..end);
    }
}
