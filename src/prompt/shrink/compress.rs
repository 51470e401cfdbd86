use std::sync::LazyLock;

use regex::Regex;

use super::{truncate_words, Shrinker};
use crate::tokenizer::{Tokenizer, TokenizerError};

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static MULTI_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static BOLD_STARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").unwrap());
static BOLD_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b__([^_\n]+)__\b").unwrap());
static ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").unwrap());
static ITALIC_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b_([^_\n]+)_\b").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]\n]+)\]\([^)\n]*\)").unwrap());

/// Staged lossy compression: whitespace first, then markdown syntax, then
/// word-level truncation. Each stage runs only if the previous one was not
/// enough.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressShrinker;

impl Shrinker for CompressShrinker {
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

        let collapsed = collapse_whitespace(content);
        if tokenizer.count(&collapsed, model)? <= target_tokens {
            return Ok(collapsed);
        }

        let plain = collapse_whitespace(&strip_markdown(&collapsed));
        if tokenizer.count(&plain, model)? <= target_tokens {
            return Ok(plain);
        }

        truncate_words(&plain, target_tokens, model, tokenizer)
    }
}

pub fn collapse_whitespace(content: &str) -> String {
    let text = content.replace('\t', " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    let text = MULTI_SPACE.replace_all(&text, " ");
    text.trim().to_string()
}

pub fn strip_markdown(content: &str) -> String {
    let text = CODE_FENCE.replace_all(content, "");
    let text = BOLD_STARS.replace_all(&text, "$1");
    let text = BOLD_UNDERSCORES.replace_all(&text, "$1");
    let text = ITALIC_STAR.replace_all(&text, "$1");
    let text = ITALIC_UNDERSCORE.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = HEADING.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    text.into_owned()
}
