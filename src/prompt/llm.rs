use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::section::ChatMessage;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Chat request failed: {0}")]
    Request(String),
    #[error("Chat response could not be read: {0}")]
    Response(String),
}

/// Per-call options forwarded to the chat driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub stop: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: Option<String>,
    pub prompt_tokens: Option<usize>,
    pub completion_tokens: Option<usize>,
}

impl ChatResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: None,
            prompt_tokens: None,
            completion_tokens: None,
        }
    }
}

/// The language model behind [`PromptComposer::run`](super::PromptComposer::run).
///
/// Retries, timeouts and transport concerns belong to the implementation.
pub trait ChatDriver: Send + Sync {
    fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, LlmError>;

    /// Model the driver talks to, if it knows. Used when the composer has no
    /// model pinned.
    fn model(&self) -> Option<&str> {
        None
    }
}
