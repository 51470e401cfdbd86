use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a single fit did, kept in memory when tracing is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitTrace {
    pub fitted_at: DateTime<Utc>, // informational only
    pub model: String,
    pub context_window: usize,
    pub reserved_output_tokens: usize,
    pub available_tokens: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub shrunk: bool,
    pub sections: Vec<SectionTrace>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTrace {
    pub name: String,
    pub priority: i32,
    pub shrinker: Option<String>,
    pub tokens_before: usize,
    pub tokens_after: usize,
}
