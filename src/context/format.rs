use serde::Serialize;

use super::item::ContextItem;
use super::metadata::Metadata;

/// Textual renderings of a collection for inclusion in a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptFormat {
    #[default]
    Numbered,
    Markdown,
    Json,
}

impl PromptFormat {
    /// Parse a format name. Unknown names render as [`PromptFormat::Numbered`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "markdown" | "md" => PromptFormat::Markdown,
            "json" => PromptFormat::Json,
            _ => PromptFormat::Numbered,
        }
    }
}

impl From<&str> for PromptFormat {
    fn from(name: &str) -> Self {
        PromptFormat::from_name(name)
    }
}

#[derive(Serialize)]
struct ItemRecord<'a> {
    content: &'a str,
    score: f64,
    source: &'a str,
    metadata: &'a Metadata,
}

pub(crate) fn render(items: &[ContextItem], format: PromptFormat) -> String {
    match format {
        PromptFormat::Numbered => numbered(items),
        PromptFormat::Markdown => markdown(items),
        PromptFormat::Json => json(items),
    }
}

fn numbered(items: &[ContextItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "[{}] (score: {:.2}, source: {})\n{}",
                i + 1,
                item.score(),
                item.source(),
                item.content()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn markdown(items: &[ContextItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "### Context {}\n\n{}\n\n*Source: {}*",
                i + 1,
                item.content(),
                item.source()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

fn json(items: &[ContextItem]) -> String {
    let records: Vec<ItemRecord> = items
        .iter()
        .map(|item| ItemRecord {
            content: item.content(),
            score: item.score(),
            source: item.source(),
            metadata: item.metadata(),
        })
        .collect();

    // Plain strings, numbers and string-keyed maps always serialize.
    serde_json::to_string_pretty(&records).unwrap_or_default()
}
