pub mod collection;
pub mod format;
pub mod item;
pub mod metadata;

pub use collection::{ContextCollection, MIN_PARTIAL_TOKENS};
pub use format::PromptFormat;
pub use item::ContextItem;
pub use metadata::{Metadata, MetadataValue};
