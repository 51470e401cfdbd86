//! Multi-source context aggregation and token-budgeted prompt composition.
//!
//! `context-compose` fans a query out to pluggable retrieval sources, merges,
//! deduplicates and ranks what they return, and assembles the result with
//! other prioritized prompt sections into a prompt that never exceeds the
//! target model's context window. Lower-priority content is shrunk with
//! pluggable strategies; content marked as non-shrinkable is never altered.
//!
//! See <https://github.com/contextenginehq/context-engine> for the full platform.

pub mod context;
pub mod pipeline;
pub mod prompt;
pub mod source;
pub mod tokenizer;
pub mod types;

