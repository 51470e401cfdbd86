use std::cmp::Reverse;
use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::llm::{ChatDriver, ChatOptions, ChatResponse, LlmError};
use super::section::{ChatMessage, Content, Section};
use super::shrink::{Shrinker, ShrinkerRegistry, TRUNCATE};
use super::trace::{FitTrace, SectionTrace};
use crate::context::{ContextCollection, PromptFormat};
use crate::tokenizer::{BpeTokenizer, Tokenizer, TokenizerError};

/// Model assumed when neither the composer nor its driver names one.
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_RESERVED_OUTPUT_TOKENS: usize = 1024;

pub const SYSTEM_PRIORITY: i32 = 100;
pub const USER_PRIORITY: i32 = 90;
pub const CONTEXT_PRIORITY: i32 = 50;
pub const HISTORY_PRIORITY: i32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Tokens kept free for the model's answer.
    pub reserved_output_tokens: usize,
    pub default_model: String,
    /// Record a [`FitTrace`] on every fit.
    pub trace: bool,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            reserved_output_tokens: DEFAULT_RESERVED_OUTPUT_TOKENS,
            default_model: DEFAULT_MODEL.to_string(),
            trace: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ComposerError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(
        "Non-shrinkable sections need {required} tokens but only {available} are available for {model}"
    )]
    BudgetExceeded {
        required: usize,
        available: usize,
        model: String,
    },
    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Assembles prioritized sections into a prompt that fits a model's context
/// window.
///
/// The composer is either unfitted or fitted. Adding a section always makes it
/// unfitted again; fitting an already fitted composer does nothing.
pub struct PromptComposer {
    sections: Vec<Section>,
    config: ComposerConfig,
    model: Option<String>,
    fitted: bool,
    shrinkers: ShrinkerRegistry,
    tokenizer: Arc<dyn Tokenizer>,
    driver: Option<Arc<dyn ChatDriver>>,
    last_trace: Option<FitTrace>,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(ComposerConfig::default())
    }
}

impl PromptComposer {
    pub fn new(config: ComposerConfig) -> Self {
        Self {
            sections: Vec::new(),
            config,
            model: None,
            fitted: false,
            shrinkers: ShrinkerRegistry::default(),
            tokenizer: Arc::new(BpeTokenizer::new()),
            driver: None,
            last_trace: None,
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self.fitted = false;
        self
    }

    /// Pin the model. Takes precedence over the driver's model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self.fitted = false;
        self
    }

    pub fn with_reserved_output_tokens(mut self, tokens: usize) -> Self {
        self.config.reserved_output_tokens = tokens;
        self.fitted = false;
        self
    }

    pub fn with_driver(mut self, driver: Arc<dyn ChatDriver>) -> Self {
        self.driver = Some(driver);
        self.fitted = false;
        self
    }

    pub fn register_shrinker(
        &mut self,
        name: impl Into<String>,
        shrinker: impl Shrinker + 'static,
    ) -> &mut Self {
        self.shrinkers.register(name, shrinker);
        self.fitted = false;
        self
    }

    pub fn add_section(&mut self, section: Section) -> &mut Self {
        self.sections.push(section);
        self.fitted = false;
        self
    }

    /// System instructions. Never shrunk.
    pub fn system(&mut self, text: impl Into<String>) -> &mut Self {
        self.add_section(Section::text("system", text).with_priority(SYSTEM_PRIORITY))
    }

    /// The user's request. Never shrunk.
    pub fn user(&mut self, text: impl Into<String>) -> &mut Self {
        self.add_section(Section::text("user", text).with_priority(USER_PRIORITY))
    }

    /// Retrieved context, shrinkable by truncation.
    pub fn context(&mut self, collection: ContextCollection, format: PromptFormat) -> &mut Self {
        self.add_section(collection.into_section("context", CONTEXT_PRIORITY, format))
    }

    /// Prior turns, shrinkable by truncation.
    pub fn history(&mut self, turns: Vec<ChatMessage>) -> &mut Self {
        self.add_section(
            Section::turns("history", turns)
                .with_priority(HISTORY_PRIORITY)
                .with_shrinker(TRUNCATE),
        )
    }

    pub fn clear(&mut self) {
        self.sections.clear();
        self.fitted = false;
        self.last_trace = None;
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn last_trace(&self) -> Option<&FitTrace> {
        self.last_trace.as_ref()
    }

    /// Pinned model, else the driver's, else the configured default.
    pub fn effective_model(&self) -> String {
        self.model
            .clone()
            .or_else(|| {
                self.driver
                    .as_ref()
                    .and_then(|d| d.model().map(str::to_string))
            })
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    /// Input tokens left once the output reservation is taken.
    pub fn available_tokens(&self) -> usize {
        self.tokenizer
            .context_window(&self.effective_model())
            .saturating_sub(self.config.reserved_output_tokens)
    }

    /// Tokens of all sections as they currently stand.
    pub fn total_tokens(&self) -> Result<usize, ComposerError> {
        let model = self.effective_model();
        Ok(self.section_costs(&model)?.iter().sum())
    }

    fn section_costs(&self, model: &str) -> Result<Vec<usize>, TokenizerError> {
        self.sections
            .iter()
            .map(|s| self.tokenizer.count(&s.render(), model))
            .collect()
    }

    /// Fit all sections into the available token budget.
    ///
    /// # Algorithm
    ///
    /// 1. Order sections by priority, highest first (stable)
    /// 2. If everything fits, stop
    /// 3. If the non-shrinkable sections alone exceed the budget → error
    /// 4. Split what they leave equally between shrinkable sections and
    ///    shrink each to its share
    pub fn fit(&mut self) -> Result<(), ComposerError> {
        if self.fitted {
            return Ok(());
        }

        let model = self.effective_model();
        let context_window = self.tokenizer.context_window(&model);
        let available = context_window.saturating_sub(self.config.reserved_output_tokens);

        // Stable: equal priorities keep insertion order.
        self.sections.sort_by_key(|s| Reverse(s.priority()));
        let strategies = self.resolve_shrinkers()?;

        let costs = self.section_costs(&model)?;
        let total: usize = costs.iter().sum();

        tracing::debug!(
            model = %model,
            sections = self.sections.len(),
            total,
            available,
            "fitting prompt sections"
        );

        if total <= available {
            self.finish(&model, context_window, available, &costs, &costs, false);
            return Ok(());
        }

        let fixed_cost: usize = self
            .sections
            .iter()
            .zip(&costs)
            .filter(|(s, _)| !s.is_shrinkable())
            .map(|(_, cost)| cost)
            .sum();

        if fixed_cost > available {
            return Err(ComposerError::BudgetExceeded {
                required: fixed_cost,
                available,
                model,
            });
        }

        let shrinkable = strategies.iter().filter(|s| s.is_some()).count();
        // With nothing shrinkable the fixed cost is the total, which already
        // failed above. Only guards the division below.
        if shrinkable == 0 {
            tracing::warn!(total, available, "prompt is over budget with nothing to shrink");
            self.finish(&model, context_window, available, &costs, &costs, false);
            return Ok(());
        }

        let per_section = (available - fixed_cost) / shrinkable;

        let mut shrunk = Vec::with_capacity(self.sections.len());
        for (section, strategy) in self.sections.iter().zip(&strategies) {
            let content = match strategy {
                Some(shrinker) => Some(self.shrink_content(
                    section.content(),
                    shrinker.as_ref(),
                    per_section,
                    &model,
                )?),
                None => None,
            };
            shrunk.push(content);
        }

        let sections = std::mem::take(&mut self.sections);
        self.sections = sections
            .into_iter()
            .zip(shrunk)
            .map(|(section, content)| match content {
                Some(content) => section.with_content(content),
                None => section,
            })
            .collect();

        let costs_after = self.section_costs(&model)?;
        tracing::info!(
            model = %model,
            shrinkable,
            per_section,
            tokens_before = total,
            tokens_after = costs_after.iter().sum::<usize>(),
            available,
            "shrunk prompt sections to fit"
        );

        self.finish(&model, context_window, available, &costs, &costs_after, true);
        Ok(())
    }

    /// Map every section to its shrinker, failing on unknown names before any
    /// section is touched.
    fn resolve_shrinkers(&self) -> Result<Vec<Option<Arc<dyn Shrinker>>>, ComposerError> {
        self.sections
            .iter()
            .map(|section| match section.shrinker() {
                None => Ok(None),
                Some(name) => self.shrinkers.get(name).map(Some).ok_or_else(|| {
                    ComposerError::Configuration(format!(
                        "unknown shrinker '{name}' on section '{}'",
                        section.name()
                    ))
                }),
            })
            .collect()
    }

    /// Text shrinks as one piece. Turns are fitted as a whole, see
    /// [`Self::fit_turns`].
    fn shrink_content(
        &self,
        content: &Content,
        shrinker: &dyn Shrinker,
        target: usize,
        model: &str,
    ) -> Result<Content, TokenizerError> {
        match content {
            Content::Text(text) => Ok(Content::Text(shrinker.shrink(
                text,
                target,
                model,
                self.tokenizer.as_ref(),
            )?)),
            Content::Turns(turns) => Ok(Content::Turns(
                self.fit_turns(turns, shrinker, target, model)?,
            )),
        }
    }

    /// Keep the most recent turns whole while the rendered section stays
    /// within `target`, then shrink the newest turn that did not fit into
    /// what is left. Older turns are dropped.
    fn fit_turns(
        &self,
        turns: &[ChatMessage],
        shrinker: &dyn Shrinker,
        target: usize,
        model: &str,
    ) -> Result<Vec<ChatMessage>, TokenizerError> {
        let tokenizer = self.tokenizer.as_ref();
        let mut kept = VecDeque::with_capacity(turns.len());
        let mut overflow = None;

        for turn in turns.iter().rev() {
            kept.push_front(turn.clone());
            if tokenizer.count(&render_turns(&kept), model)? > target {
                overflow = kept.pop_front();
                break;
            }
        }

        if let Some(turn) = overflow {
            // Kept turns plus the joining newline.
            let used = if kept.is_empty() {
                0
            } else {
                tokenizer.count(&render_turns(&kept), model)? + 1
            };
            let prefix = tokenizer.count(&format!("{}: ", turn.role), model)?;
            let mut budget = target.saturating_sub(used + prefix);

            // Token counts do not add up exactly across joins; re-measure.
            while budget > 0 {
                let text = shrinker.shrink(&turn.content, budget, model, tokenizer)?;
                if text.is_empty() {
                    break;
                }
                kept.push_front(ChatMessage::new(turn.role, text));
                let measured = tokenizer.count(&render_turns(&kept), model)?;
                if measured <= target {
                    break;
                }
                kept.pop_front();
                budget = budget.saturating_sub(measured - target);
            }
        }

        Ok(kept.into())
    }

    fn finish(
        &mut self,
        model: &str,
        context_window: usize,
        available: usize,
        before: &[usize],
        after: &[usize],
        shrunk: bool,
    ) {
        self.fitted = true;
        if !self.config.trace {
            return;
        }

        let sections = self
            .sections
            .iter()
            .zip(before.iter().zip(after))
            .map(|(section, (&tokens_before, &tokens_after))| SectionTrace {
                name: section.name().to_string(),
                priority: section.priority(),
                shrinker: section.shrinker().map(str::to_string),
                tokens_before,
                tokens_after,
            })
            .collect();

        self.last_trace = Some(FitTrace {
            fitted_at: Utc::now(),
            model: model.to_string(),
            context_window,
            reserved_output_tokens: self.config.reserved_output_tokens,
            available_tokens: available,
            tokens_before: before.iter().sum(),
            tokens_after: after.iter().sum(),
            shrunk,
            sections,
        });
    }

    /// Fit if needed, then flatten sections into chat messages in priority
    /// order.
    pub fn to_messages(&mut self) -> Result<Vec<ChatMessage>, ComposerError> {
        self.fit()?;
        Ok(self
            .sections
            .iter()
            .flat_map(Section::to_messages)
            .filter(|m| !m.content.is_empty())
            .collect())
    }

    /// Fit if needed, then join rendered sections with blank lines in
    /// priority order.
    pub fn to_text(&mut self) -> Result<String, ComposerError> {
        self.fit()?;
        Ok(self
            .sections
            .iter()
            .map(Section::render)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// Send the fitted prompt to the attached driver.
    ///
    /// Fails with [`ComposerError::Configuration`] before any token work when
    /// no driver is attached. `max_tokens` defaults to the output reservation.
    pub fn run(&mut self, options: ChatOptions) -> Result<ChatResponse, ComposerError> {
        let driver = self
            .driver
            .clone()
            .ok_or_else(|| ComposerError::Configuration("no chat driver attached".to_string()))?;

        let messages = self.to_messages()?;
        let mut options = options;
        if options.max_tokens.is_none() {
            options.max_tokens = Some(self.config.reserved_output_tokens);
        }

        tracing::debug!(messages = messages.len(), "sending composed prompt");
        Ok(driver.chat(&messages, &options)?)
    }
}

/// Same form as [`Content::render`] for turns.
fn render_turns(turns: &VecDeque<ChatMessage>) -> String {
    turns
        .iter()
        .map(ChatMessage::render)
        .collect::<Vec<_>>()
        .join("\n")
}
