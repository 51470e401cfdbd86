use std::fmt;

use serde::{Deserialize, Serialize};

use super::TokenId;

/// Context window used for models that match no known pattern.
pub const DEFAULT_CONTEXT_WINDOW: usize = 4096;

/// BPE encodings known to the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    Cl100kBase,
    O200kBase,
    P50kBase,
    R50kBase,
}

impl Encoding {
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Cl100kBase => "cl100k_base",
            Encoding::O200kBase => "o200k_base",
            Encoding::P50kBase => "p50k_base",
            Encoding::R50kBase => "r50k_base",
        }
    }

    /// Whether `token` is an ordinary or special token of this encoding.
    pub fn contains_token(&self, token: TokenId) -> bool {
        match self {
            Encoding::Cl100kBase => token < 100_256 || matches!(token, 100_257..=100_260 | 100_276),
            Encoding::O200kBase => token < 199_998 || matches!(token, 199_999 | 200_018),
            // 50256 is <|endoftext|> in both.
            Encoding::P50kBase => token <= 50_280,
            Encoding::R50kBase => token <= 50_256,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved tokenization parameters for a model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub encoding: Encoding,
    pub context_window: usize,
}

impl ModelSpec {
    pub const DEFAULT: ModelSpec = ModelSpec {
        encoding: Encoding::Cl100kBase,
        context_window: DEFAULT_CONTEXT_WINDOW,
    };
}

// (substring, encoding, context window). Lookup picks the longest matching
// substring, so ordering here is cosmetic.
const MODEL_TABLE: &[(&str, Encoding, usize)] = &[
    ("gpt-4o-mini", Encoding::O200kBase, 128_000),
    ("gpt-4o", Encoding::O200kBase, 128_000),
    ("gpt-4.1", Encoding::O200kBase, 1_047_576),
    ("o1-mini", Encoding::O200kBase, 128_000),
    ("o1", Encoding::O200kBase, 200_000),
    ("o3", Encoding::O200kBase, 200_000),
    ("gpt-4-turbo", Encoding::Cl100kBase, 128_000),
    ("gpt-4-1106", Encoding::Cl100kBase, 128_000),
    ("gpt-4-0125", Encoding::Cl100kBase, 128_000),
    ("gpt-4-32k", Encoding::Cl100kBase, 32_768),
    ("gpt-4", Encoding::Cl100kBase, 8_192),
    ("gpt-3.5-turbo-16k", Encoding::Cl100kBase, 16_385),
    ("gpt-3.5-turbo", Encoding::Cl100kBase, 16_385),
    ("text-embedding", Encoding::Cl100kBase, 8_191),
    ("text-davinci-003", Encoding::P50kBase, 4_097),
    ("text-davinci-002", Encoding::P50kBase, 4_097),
    ("code-davinci", Encoding::P50kBase, 8_001),
    ("davinci", Encoding::R50kBase, 2_049),
    ("claude-3", Encoding::Cl100kBase, 200_000),
    ("claude-sonnet", Encoding::Cl100kBase, 200_000),
    ("claude-opus", Encoding::Cl100kBase, 200_000),
    ("claude-haiku", Encoding::Cl100kBase, 200_000),
    ("claude-2", Encoding::Cl100kBase, 100_000),
    ("claude", Encoding::Cl100kBase, 100_000),
    ("llama-3.1", Encoding::Cl100kBase, 128_000),
    ("llama-3", Encoding::Cl100kBase, 8_192),
    ("llama", Encoding::Cl100kBase, 4_096),
    ("mixtral", Encoding::Cl100kBase, 32_768),
    ("mistral", Encoding::Cl100kBase, 32_768),
    ("gemini-1.5", Encoding::Cl100kBase, 1_000_000),
    ("gemini", Encoding::Cl100kBase, 32_768),
];

/// Look up a model by name. Matching is case-insensitive on substrings; the
/// most specific (longest) pattern wins.
pub fn lookup(model: &str) -> Option<ModelSpec> {
    let model = model.to_lowercase();

    MODEL_TABLE
        .iter()
        .filter(|(pattern, _, _)| model.contains(pattern))
        .max_by_key(|(pattern, _, _)| pattern.len())
        .map(|&(_, encoding, context_window)| ModelSpec {
            encoding,
            context_window,
        })
}

/// Like [`lookup`], falling back to [`ModelSpec::DEFAULT`].
pub fn resolve(model: &str) -> ModelSpec {
    lookup(model).unwrap_or(ModelSpec::DEFAULT)
}
