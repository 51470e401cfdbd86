use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::{Metadata, MetadataValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Role for a plain-text section, inferred from its name.
    pub fn for_section_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "system" => Role::System,
            "assistant" | "response" => Role::Assistant,
            _ => Role::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// `role: content`, the form a turn takes in flat text.
    pub fn render(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Content {
    Text(String),
    Turns(Vec<ChatMessage>),
}

impl Content {
    /// Flat string form. This is what the fitter measures.
    pub fn render(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Turns(turns) => turns
                .iter()
                .map(ChatMessage::render)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A named, prioritized unit of prompt content.
///
/// Higher priority renders first and is never traded away for lower priority
/// content. A section without a shrinker is either kept whole or the fit
/// fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    name: String,
    content: Content,
    priority: i32,
    shrinker: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

impl Section {
    pub fn new(name: impl Into<String>, content: Content) -> Self {
        Self {
            name: name.into(),
            content,
            priority: 0,
            shrinker: None,
            metadata: Metadata::new(),
        }
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, Content::Text(text.into()))
    }

    pub fn turns(name: impl Into<String>, turns: Vec<ChatMessage>) -> Self {
        Self::new(name, Content::Turns(turns))
    }

    pub fn with_priority(self, priority: i32) -> Self {
        Self { priority, ..self }
    }

    pub fn with_shrinker(self, shrinker: impl Into<String>) -> Self {
        Self {
            shrinker: Some(shrinker.into()),
            ..self
        }
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key, value);
        self
    }

    pub(crate) fn with_content(self, content: Content) -> Self {
        Self { content, ..self }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn shrinker(&self) -> Option<&str> {
        self.shrinker.as_deref()
    }

    pub fn is_shrinkable(&self) -> bool {
        self.shrinker.is_some()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn render(&self) -> String {
        self.content.render()
    }

    /// Chat turns for this section. Text becomes a single turn whose role is
    /// inferred from the section name.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        match &self.content {
            Content::Text(text) => vec![ChatMessage::new(
                Role::for_section_name(&self.name),
                text.clone(),
            )],
            Content::Turns(turns) => turns.clone(),
        }
    }
}
