use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tiktoken_rs::CoreBPE;

use super::models::{self, Encoding};
use super::{TokenId, Tokenizer, TokenizerError};

/// Tokenizer backed by the tiktoken BPE tables.
///
/// Encoders are built lazily, once per encoding, and shared between threads.
#[derive(Default)]
pub struct BpeTokenizer {
    encoders: RwLock<HashMap<Encoding, Arc<CoreBPE>>>,
}

impl BpeTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn encoder(&self, model: &str) -> Result<Arc<CoreBPE>, TokenizerError> {
        let encoding = models::resolve(model).encoding;

        if let Some(bpe) = self.encoders.read().get(&encoding) {
            return Ok(Arc::clone(bpe));
        }

        let mut encoders = self.encoders.write();
        // Another thread may have won the race between the two locks.
        if let Some(bpe) = encoders.get(&encoding) {
            return Ok(Arc::clone(bpe));
        }

        tracing::debug!(encoding = %encoding, "loading BPE encoding");
        let bpe = Arc::new(load(encoding)?);
        encoders.insert(encoding, Arc::clone(&bpe));
        Ok(bpe)
    }
}

fn load(encoding: Encoding) -> Result<CoreBPE, TokenizerError> {
    let loaded = match encoding {
        Encoding::Cl100kBase => tiktoken_rs::cl100k_base(),
        Encoding::O200kBase => tiktoken_rs::o200k_base(),
        Encoding::P50kBase => tiktoken_rs::p50k_base(),
        Encoding::R50kBase => tiktoken_rs::r50k_base(),
    };

    loaded.map_err(|e| TokenizerError::EncodingLoad {
        encoding,
        reason: e.to_string(),
    })
}

impl Tokenizer for BpeTokenizer {
    fn count(&self, text: &str, model: &str) -> Result<usize, TokenizerError> {
        if text.is_empty() {
            return Ok(0);
        }
        Ok(self.encoder(model)?.encode_with_special_tokens(text).len())
    }

    fn encode(&self, text: &str, model: &str) -> Result<Vec<TokenId>, TokenizerError> {
        let tokens = self.encoder(model)?.encode_with_special_tokens(text);
        Ok(tokens.into_iter().map(|t| t as TokenId).collect())
    }

    /// Decode a token sequence.
    ///
    /// Byte-level tokens do not respect character boundaries, so a sequence
    /// cut at an arbitrary point can end inside a multi-byte character. That
    /// trailing partial character is dropped. Unknown ids and invalid bytes
    /// anywhere else are errors.
    fn decode(&self, tokens: &[TokenId], model: &str) -> Result<String, TokenizerError> {
        if tokens.is_empty() {
            return Ok(String::new());
        }

        let encoding = models::resolve(model).encoding;
        if let Some(unknown) = tokens.iter().find(|&&t| !encoding.contains_token(t)) {
            return Err(TokenizerError::Decode(format!(
                "token {unknown} is not in {encoding}"
            )));
        }

        let bpe = self.encoder(model)?;
        // Panics on unknown ids, which are rejected above.
        let bytes: Vec<u8> = bpe._decode_native_and_split(tokens.to_vec()).flatten().collect();

        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) => {
                let utf8 = e.utf8_error();
                if utf8.error_len().is_some() {
                    return Err(TokenizerError::Decode(utf8.to_string()));
                }
                let mut bytes = e.into_bytes();
                bytes.truncate(utf8.valid_up_to());
                String::from_utf8(bytes).map_err(|e| TokenizerError::Decode(e.to_string()))
            }
        }
    }
}
