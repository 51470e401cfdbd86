pub mod composer;
pub mod llm;
pub mod section;
pub mod shrink;
pub mod trace;

pub use composer::{ComposerConfig, ComposerError, PromptComposer, DEFAULT_MODEL};
pub use llm::{ChatDriver, ChatOptions, ChatResponse, LlmError};
pub use section::{ChatMessage, Content, Role, Section};
pub use shrink::{
    CompressShrinker, Shrinker, ShrinkerRegistry, TruncateShrinker, COMPRESS, TRUNCATE,
};
pub use trace::{FitTrace, SectionTrace};
