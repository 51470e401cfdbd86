use std::sync::{Arc, Mutex};

use context_compose::context::{ContextCollection, ContextItem, PromptFormat};
use context_compose::prompt::{
    ChatDriver, ChatMessage, ChatOptions, ChatResponse, ComposerConfig, ComposerError, Content,
    LlmError, PromptComposer, Role, Section, COMPRESS, DEFAULT_MODEL, TRUNCATE,
};
use context_compose::tokenizer::{BpeTokenizer, Tokenizer};

const MODEL: &str = "gpt-4";
const WINDOW: usize = 8_192;

/// A composer on `gpt-4` with `available` input tokens.
fn composer_with_budget(available: usize) -> PromptComposer {
    PromptComposer::default()
        .with_model(MODEL)
        .with_reserved_output_tokens(WINDOW - available)
}

fn sentences(count: usize) -> String {
    (0..count)
        .map(|i| format!("Sentence number {i} explains one more detail."))
        .collect::<Vec<_>>()
        .join(" ")
}

fn count(text: &str) -> usize {
    BpeTokenizer::new().count(text, MODEL).unwrap()
}

#[derive(Default)]
struct RecordingDriver {
    model: Option<String>,
    seen: Mutex<Vec<(Vec<ChatMessage>, ChatOptions)>>,
}

impl ChatDriver for RecordingDriver {
    fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse, LlmError> {
        self.seen
            .lock()
            .unwrap()
            .push((messages.to_vec(), options.clone()));
        Ok(ChatResponse::new(format!("saw {} messages", messages.len())))
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

#[test]
fn renders_in_priority_order() {
    let mut composer = PromptComposer::default();
    composer
        .add_section(Section::text("low", "low priority").with_priority(10))
        .add_section(Section::text("high", "high priority").with_priority(100))
        .add_section(Section::text("mid", "mid priority").with_priority(50));

    let text = composer.to_text().unwrap();
    assert_eq!(text, "high priority\n\nmid priority\n\nlow priority");

    let messages = composer.to_messages().unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["high priority", "mid priority", "low priority"]);
}

#[test]
fn equal_priorities_keep_insertion_order() {
    let mut composer = PromptComposer::default();
    composer
        .add_section(Section::text("a", "first").with_priority(5))
        .add_section(Section::text("b", "second").with_priority(5))
        .add_section(Section::text("c", "top").with_priority(9))
        .add_section(Section::text("d", "third").with_priority(5));

    assert_eq!(composer.to_text().unwrap(), "top\n\nfirst\n\nsecond\n\nthird");
}

#[test]
fn roles_are_inferred_from_section_names() {
    let mut composer = PromptComposer::default();
    composer
        .add_section(Section::text("system", "rules").with_priority(4))
        .add_section(Section::text("question", "what?").with_priority(3))
        .add_section(Section::text("response", "earlier answer").with_priority(2))
        .add_section(Section::text("notes", "misc").with_priority(1));

    let roles: Vec<Role> = composer.to_messages().unwrap().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
    assert_eq!(Role::for_section_name("Query"), Role::User);
    assert_eq!(Role::for_section_name("assistant"), Role::Assistant);
}

#[test]
fn turns_expand_into_messages() {
    let mut composer = PromptComposer::default();
    composer
        .system("be brief")
        .history(vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")])
        .user("what now?");

    let messages = composer.to_messages().unwrap();
    assert_eq!(
        messages,
        vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("what now?"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]
    );

    let text = composer.to_text().unwrap();
    assert!(text.ends_with("user: hi\nassistant: hello"));
}

#[test]
fn fitting_content_is_left_alone() {
    let mut composer = composer_with_budget(500);
    composer
        .system("You answer questions.")
        .add_section(Section::text("context", sentences(3)).with_priority(50).with_shrinker(TRUNCATE));

    composer.fit().unwrap();

    assert!(composer.is_fitted());
    assert_eq!(composer.sections()[1].render(), sentences(3));
}

#[test]
fn shrinkable_sections_are_shrunk_into_budget() {
    let available = 200;
    let mut composer = composer_with_budget(available);
    composer
        .system("You answer questions about the pipeline.")
        .user("How does deduplication work?")
        .add_section(Section::text("context", sentences(80)).with_priority(50).with_shrinker(TRUNCATE));

    assert!(composer.total_tokens().unwrap() > available);

    let text = composer.to_text().unwrap();

    assert!(count(&text) <= available + 4, "joined output stays within budget");
    assert!(composer.total_tokens().unwrap() <= available);
    assert!(text.starts_with("You answer questions about the pipeline.\n\nHow does deduplication work?"));
    let context = composer.sections()[2].render();
    assert!(!context.is_empty());
    assert!(context.ends_with('.'), "truncate keeps whole sentences");
    assert!(sentences(80).starts_with(&context));
}

#[test]
fn budget_is_split_equally_between_shrinkable_sections() {
    let available = 300;
    let system = "Fixed instructions that must survive.";
    let mut composer = composer_with_budget(available);
    composer
        .system(system)
        .add_section(Section::text("docs", sentences(60)).with_priority(50).with_shrinker(TRUNCATE))
        .add_section(Section::text("notes", sentences(90)).with_priority(40).with_shrinker(COMPRESS));

    composer.fit().unwrap();

    let per_section = (available - count(system)) / 2;
    let sections = composer.sections();
    assert_eq!(sections[0].render(), system);
    assert!(count(&sections[1].render()) <= per_section);
    assert!(count(&sections[2].render()) <= per_section);
    assert!(count(&sections[1].render()) > per_section / 2);
}

#[test]
fn fit_is_idempotent() {
    let mut composer = composer_with_budget(150);
    composer
        .system("System prompt.")
        .add_section(Section::text("context", sentences(50)).with_priority(50).with_shrinker(TRUNCATE));

    let first = composer.to_text().unwrap();
    composer.fit().unwrap();
    let second = composer.to_text().unwrap();
    let messages_first = composer.to_messages().unwrap();
    let messages_second = composer.to_messages().unwrap();

    assert_eq!(first, second);
    assert_eq!(messages_first, messages_second);
}

#[test]
fn adding_a_section_invalidates_the_fit() {
    let mut composer = PromptComposer::default();
    composer.system("rules");
    composer.fit().unwrap();
    assert!(composer.is_fitted());

    composer.user("question");
    assert!(!composer.is_fitted());

    composer.fit().unwrap();
    assert!(composer.is_fitted());
}

#[test]
fn oversized_non_shrinkable_section_is_an_error() {
    let huge = "token ".repeat(10_000);
    let mut composer = PromptComposer::default().with_model(MODEL);
    composer.add_section(Section::text("system", huge.clone()).with_priority(100));

    let err = composer.fit().unwrap_err();

    match err {
        ComposerError::BudgetExceeded {
            required,
            available,
            model,
        } => {
            assert!(required > available);
            assert_eq!(available, WINDOW - composer.config().reserved_output_tokens);
            assert_eq!(model, MODEL);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!composer.is_fitted());
    assert_eq!(composer.sections()[0].render(), huge, "content must not be truncated");
    assert!(matches!(composer.to_text(), Err(ComposerError::BudgetExceeded { .. })));
}

#[test]
fn unknown_shrinker_is_a_configuration_error() {
    let mut composer = PromptComposer::default();
    composer.add_section(Section::text("context", "text").with_shrinker("summarize"));

    let err = composer.fit().unwrap_err();
    assert!(matches!(err, ComposerError::Configuration(ref msg) if msg.contains("summarize")));
}

#[test]
fn custom_shrinkers_can_be_registered() {
    use context_compose::prompt::Shrinker;
    use context_compose::tokenizer::TokenizerError;

    struct Discard;
    impl Shrinker for Discard {
        fn shrink(&self, _: &str, _: usize, _: &str, _: &dyn Tokenizer) -> Result<String, TokenizerError> {
            Ok(String::new())
        }
    }

    let mut composer = composer_with_budget(100);
    composer
        .register_shrinker("discard", Discard)
        .system("keep me")
        .add_section(Section::text("extra", sentences(40)).with_priority(1).with_shrinker("discard"));

    assert_eq!(composer.to_text().unwrap(), "keep me");
    assert_eq!(composer.to_messages().unwrap().len(), 1);
}

#[test]
fn oversized_newest_turn_is_shrunk_and_older_turns_dropped() {
    let mut composer = composer_with_budget(120);
    composer.system("Short system prompt.").history(vec![
        ChatMessage::user(sentences(30)),
        ChatMessage::assistant(sentences(30)),
    ]);

    composer.fit().unwrap();

    let history = &composer.sections()[1];
    match history.content() {
        Content::Turns(turns) => {
            assert_eq!(turns.len(), 1);
            assert_eq!(turns[0].role, Role::Assistant);
            assert!(!turns[0].content.is_empty());
            assert!(turns[0].content.ends_with('.'));
            assert!(sentences(30).starts_with(&turns[0].content));
        }
        other => panic!("history must stay as turns, got {other:?}"),
    }
    assert!(count(&history.render()) <= 120 - count("Short system prompt."));
    assert!(composer.total_tokens().unwrap() <= composer.available_tokens());
}

fn long_history(turns: usize) -> Vec<ChatMessage> {
    (0..turns)
        .map(|i| {
            let text = format!("Turn {i} mentions one small detail about the deployment.");
            if i % 2 == 0 {
                ChatMessage::user(text)
            } else {
                ChatMessage::assistant(text)
            }
        })
        .collect()
}

#[test]
fn long_histories_keep_the_most_recent_turns() {
    for (turns, available) in [(16, 60), (32, 100)] {
        let original = long_history(turns);
        let mut composer = composer_with_budget(available);
        composer.system("sys").history(original.clone());

        composer.fit().unwrap();

        let kept = match composer.sections()[1].content() {
            Content::Turns(kept) => kept.clone(),
            other => panic!("history must stay as turns, got {other:?}"),
        };
        assert!(kept.len() >= 2, "{turns} turns at {available} kept {kept:?}");
        assert!(kept.len() < turns);
        assert!(composer.total_tokens().unwrap() <= composer.available_tokens());

        // Every kept turn but the oldest is an untouched recent turn.
        let whole = &kept[1..];
        assert_eq!(whole, &original[turns - whole.len()..]);
        let oldest = &original[turns - kept.len()];
        assert_eq!(kept[0].role, oldest.role);
        assert!(oldest.content.starts_with(&kept[0].content));

        let messages = composer.to_messages().unwrap();
        assert_eq!(messages.len(), 1 + kept.len());
    }
}

#[test]
fn context_collections_become_sections() {
    let collection: ContextCollection = vec![
        ContextItem::new("Rust has no garbage collector.", 0.9, "docs"),
        ContextItem::new("Ownership is checked at compile time.", 0.8, "docs"),
    ]
    .into();

    let mut composer = PromptComposer::default();
    composer
        .system("Answer from the context.")
        .context(collection, PromptFormat::Numbered)
        .user("Does Rust have a GC?");

    let text = composer.to_text().unwrap();
    let context_at = text.find("[1] (score: 0.90, source: docs)").unwrap();
    let user_at = text.find("Does Rust have a GC?").unwrap();
    assert!(user_at < context_at, "user question outranks retrieved context");
}

#[test]
fn run_without_driver_fails_before_token_work() {
    let mut composer = PromptComposer::default();
    composer.add_section(Section::text("system", "token ".repeat(10_000)).with_priority(100));

    let err = composer.run(ChatOptions::default()).unwrap_err();

    assert!(matches!(err, ComposerError::Configuration(_)));
    assert!(!composer.is_fitted());
}

#[test]
fn run_sends_fitted_messages_to_driver() {
    let driver = Arc::new(RecordingDriver::default());
    let mut composer = PromptComposer::default()
        .with_reserved_output_tokens(256)
        .with_driver(driver.clone());
    composer.system("rules").user("question");

    let response = composer.run(ChatOptions::default()).unwrap();

    assert_eq!(response.content, "saw 2 messages");
    let seen = driver.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, vec![ChatMessage::system("rules"), ChatMessage::user("question")]);
    assert_eq!(seen[0].1.max_tokens, Some(256));
}

#[test]
fn explicit_max_tokens_is_kept() {
    let driver = Arc::new(RecordingDriver::default());
    let mut composer = PromptComposer::default().with_driver(driver.clone());
    composer.user("question");

    let options = ChatOptions {
        max_tokens: Some(42),
        ..ChatOptions::default()
    };
    composer.run(options).unwrap();

    assert_eq!(driver.seen.lock().unwrap()[0].1.max_tokens, Some(42));
}

#[test]
fn model_resolution_order() {
    let composer = PromptComposer::default();
    assert_eq!(composer.effective_model(), DEFAULT_MODEL);

    let driver = Arc::new(RecordingDriver {
        model: Some("gpt-4o".to_string()),
        ..RecordingDriver::default()
    });
    let composer = PromptComposer::default().with_driver(driver.clone());
    assert_eq!(composer.effective_model(), "gpt-4o");
    assert_eq!(composer.available_tokens(), 128_000 - 1024);

    let composer = PromptComposer::default().with_driver(driver).with_model("gpt-3.5-turbo");
    assert_eq!(composer.effective_model(), "gpt-3.5-turbo");
}

#[test]
fn trace_records_the_last_fit() {
    let config = ComposerConfig {
        trace: true,
        ..ComposerConfig::default()
    };
    let mut composer = PromptComposer::new(config)
        .with_model(MODEL)
        .with_reserved_output_tokens(WINDOW - 100);
    composer
        .system("System prompt.")
        .add_section(Section::text("context", sentences(40)).with_priority(50).with_shrinker(TRUNCATE));

    assert!(composer.last_trace().is_none());
    composer.fit().unwrap();

    let trace = composer.last_trace().expect("trace enabled");
    assert!(trace.shrunk);
    assert_eq!(trace.model, MODEL);
    assert_eq!(trace.available_tokens, 100);
    assert!(trace.tokens_before > trace.tokens_after);
    assert!(trace.tokens_after <= 100);
    assert_eq!(trace.sections.len(), 2);
    assert_eq!(trace.sections[0].name, "system");
    assert_eq!(trace.sections[0].tokens_before, trace.sections[0].tokens_after);
    assert_eq!(trace.sections[1].shrinker.as_deref(), Some(TRUNCATE));

    let json = serde_json::to_value(trace).unwrap();
    assert_eq!(json["sections"][1]["name"], "context");
}

#[test]
fn config_deserializes_with_defaults() {
    let config: ComposerConfig = serde_json::from_str(r#"{"trace": true}"#).unwrap();
    assert!(config.trace);
    assert_eq!(config.reserved_output_tokens, 1024);
    assert_eq!(config.default_model, DEFAULT_MODEL);
}
