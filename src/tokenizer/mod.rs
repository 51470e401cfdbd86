pub mod bpe;
pub mod models;

use thiserror::Error;

pub use bpe::BpeTokenizer;
pub use models::{Encoding, ModelSpec, DEFAULT_CONTEXT_WINDOW};

/// A single model token.
pub type TokenId = u32;

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("Failed to load encoding {encoding}: {reason}")]
    EncodingLoad { encoding: Encoding, reason: String },
    #[error("Token sequence could not be decoded: {0}")]
    Decode(String),
}

/// Model-aware token accounting.
///
/// Implementations must be safe to share across threads; any internal caching
/// is invisible to callers.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str, model: &str) -> Result<usize, TokenizerError>;

    fn encode(&self, text: &str, model: &str) -> Result<Vec<TokenId>, TokenizerError>;

    fn decode(&self, tokens: &[TokenId], model: &str) -> Result<String, TokenizerError>;

    /// Maximum number of input tokens the model accepts.
    fn context_window(&self, model: &str) -> usize {
        models::resolve(model).context_window
    }

    /// Whether the model is known. Unknown models still tokenize with the
    /// default encoding and window.
    fn supports(&self, model: &str) -> bool {
        models::lookup(model).is_some()
    }
}
