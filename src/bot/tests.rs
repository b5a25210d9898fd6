//! Behaviour of the command handlers against stub models.
//!
//! Run with: cargo test bot

use std::sync::Arc;

use super::*;
use crate::config::{ChatSettings, ClassifierModel, GenerationSettings, ModerationSettings};
use crate::models::ModelKind;
use crate::testing::StubProvider;

fn moderation_settings() -> ModerationSettings {
    ModerationSettings {
        model: ClassifierModel::toxic(),
        threshold: 0.7,
        flag_labels: vec!["toxic".to_string(), "hate".to_string(), "label_1".to_string()],
    }
}

fn services_with(provider: StubProvider) -> (Arc<StubProvider>, Services) {
    let provider = Arc::new(provider);
    let services = Services::new(
        provider.clone(),
        moderation_settings(),
        GenerationSettings::default(),
        &ChatSettings::default(),
    );
    (provider, services)
}

fn services() -> (Arc<StubProvider>, Services) {
    services_with(StubProvider::default())
}

// =============================================================================
// SENTIMENT
// =============================================================================

mod analyze {
    use super::*;

    #[tokio::test]
    async fn test_positive_text() {
        let (_, s) = services();
        let out = s.execute(&Command::Analyze("I love this!".into()), "1").await.unwrap();
        assert!(out.contains("<b>Sentiment:</b> POSITIVE"));
        assert!(out.contains("99.87%"));
    }

    #[tokio::test]
    async fn test_text_is_escaped() {
        let (_, s) = services();
        let out = s.execute(&Command::Analyze("<b>bad</b>".into()), "1").await.unwrap();
        assert!(out.contains("&lt;b&gt;bad&lt;/b&gt;"));
        assert!(out.contains("NEGATIVE"));
    }

    #[tokio::test]
    async fn test_missing_text_loads_nothing() {
        let (provider, s) = services();
        let err = s.execute(&Command::Analyze("   ".into()), "1").await.unwrap_err();
        assert!(matches!(err, CommandError::Usage(_)));
        assert_eq!(provider.constructions(ModelKind::Sentiment), 0);
    }

    #[tokio::test]
    async fn test_loads_model_once() {
        let (provider, s) = services();
        for text in ["good", "bad", "great"] {
            s.execute(&Command::Analyze(text.into()), "1").await.unwrap();
        }
        assert_eq!(provider.constructions(ModelKind::Sentiment), 1);
        assert_eq!(provider.calls(ModelKind::Sentiment), 3);
    }
}

// =============================================================================
// MODERATION
// =============================================================================

mod moderate {
    use super::*;

    #[tokio::test]
    async fn test_flags_toxic_text() {
        let (_, s) = services();
        let out = s.execute(&Command::Moderate("You're stupid".into()), "1").await.unwrap();
        assert!(out.contains("INAPPROPRIATE"));
        assert!(out.contains("95.00%"));
    }

    #[tokio::test]
    async fn test_clean_text() {
        let (_, s) = services();
        let out = s.execute(&Command::Moderate("Hello friend".into()), "1").await.unwrap();
        assert!(out.contains("<b>Status:</b> APPROPRIATE"));
    }

    #[tokio::test]
    async fn test_threshold_comes_from_settings() {
        let provider = Arc::new(StubProvider::default());
        let mut settings = moderation_settings();
        settings.threshold = 0.01;
        let s = Services::new(provider, settings, GenerationSettings::default(), &ChatSettings::default());
        let out = s.execute(&Command::Moderate("Hello friend".into()), "1").await.unwrap();
        assert!(out.contains("INAPPROPRIATE"));
    }

    #[tokio::test]
    async fn test_unflagged_label_never_flags() {
        let provider = Arc::new(StubProvider::default());
        let mut settings = moderation_settings();
        settings.flag_labels = vec!["hate".to_string()];
        let s = Services::new(provider, settings, GenerationSettings::default(), &ChatSettings::default());
        let out = s.execute(&Command::Moderate("You're stupid".into()), "1").await.unwrap();
        assert!(out.contains("<b>Status:</b> APPROPRIATE"));
    }
}

// =============================================================================
// GENERATION
// =============================================================================

mod generate {
    use super::*;

    #[tokio::test]
    async fn test_generates_from_prompt() {
        let (_, s) = services();
        let out = s.execute(&Command::Generate("Once upon a time".into()), "1").await.unwrap();
        assert!(out.contains("<b>Prompt:</b> Once upon a time"));
        assert!(out.contains("Once upon a time and then sample 0 (100 tokens)"));
    }

    #[tokio::test]
    async fn test_missing_prompt() {
        let (provider, s) = services();
        let err = s.execute(&Command::Generate(String::new()), "1").await.unwrap_err();
        assert!(err.user_message().contains("/help generate"));
        assert_eq!(provider.calls(ModelKind::Generation), 0);
    }
}

// =============================================================================
// QUESTION ANSWERING
// =============================================================================

mod qa {
    use super::*;

    #[tokio::test]
    async fn test_answers_from_context() {
        let (_, s) = services();
        let out = s
            .execute(&Command::Qa("The Eiffel Tower is in Paris | Where is it?".into()), "1")
            .await
            .unwrap();
        assert!(out.contains("<b>Context:</b> The Eiffel Tower is in Paris"));
        assert!(out.contains("<b>Question:</b> Where is it?"));
        assert!(out.contains("<b>Answer:</b> Paris"));
    }

    #[tokio::test]
    async fn test_later_bars_stay_in_question() {
        let (_, s) = services();
        let out = s.execute(&Command::Qa("ctx text | a | b".into()), "1").await.unwrap();
        assert!(out.contains("<b>Question:</b> a | b"));
        assert!(out.contains("<b>Answer:</b> text"));
    }

    #[tokio::test]
    async fn test_no_separator_no_model_call() {
        let (provider, s) = services();
        let err = s.execute(&Command::Qa("What is AI?".into()), "1").await.unwrap_err();
        assert!(matches!(err, CommandError::Usage(_)));
        assert!(err.user_message().contains("/qa &lt;context&gt; | &lt;question&gt;"));
        assert_eq!(provider.constructions(ModelKind::QuestionAnswering), 0);
        assert_eq!(provider.calls(ModelKind::QuestionAnswering), 0);
    }
}

// =============================================================================
// CHAT SESSIONS
// =============================================================================

mod chat {
    use super::*;

    #[tokio::test]
    async fn test_resetchat_without_session() {
        let (_, s) = services();
        let out = s.execute(&Command::Resetchat, "42").await.unwrap();
        assert_eq!(out, "You don't have an active conversation.");
    }

    #[tokio::test]
    async fn test_chat_remembers_then_resets() {
        let (_, s) = services();
        s.execute(&Command::Chat("Hi! How are you?".into()), "42").await.unwrap();
        let out = s.execute(&Command::Chat("Tell me a joke".into()), "42").await.unwrap();
        assert_eq!(out, "re: Tell me a joke [prior: Hi! How are you?]");

        let out = s.execute(&Command::Resetchat, "42").await.unwrap();
        assert_eq!(out, "✅ Your conversation history has been reset!");

        let out = s.execute(&Command::Chat("Hello again".into()), "42").await.unwrap();
        assert_eq!(out, "re: Hello again [prior: ]");
    }

    #[tokio::test]
    async fn test_users_do_not_share_context() {
        let (_, s) = services();
        s.execute(&Command::Chat("I am alice".into()), "1").await.unwrap();
        let out = s.execute(&Command::Chat("who am I?".into()), "2").await.unwrap();
        assert_eq!(out, "re: who am I? [prior: ]");
        assert_eq!(s.sessions().len().await, 2);
    }

    #[tokio::test]
    async fn test_reply_is_escaped() {
        let (_, s) = services();
        let out = s.execute(&Command::Chat("<script>".into()), "1").await.unwrap();
        assert!(out.contains("re: &lt;script&gt;"));
    }
}

// =============================================================================
// STATIC COMMANDS
// =============================================================================

mod static_commands {
    use super::*;

    #[tokio::test]
    async fn test_models_reports_load_state() {
        let (_, s) = services();
        let before = s.execute(&Command::Models, "1").await.unwrap();
        assert_eq!(before.matches("loads on first use").count(), 5);

        s.execute(&Command::Generate("x".into()), "1").await.unwrap();
        let after = s.execute(&Command::Models, "1").await.unwrap();
        assert_eq!(after.matches("loads on first use").count(), 4);
        assert!(s.registry().is_loaded(ModelKind::Generation));
    }

    #[tokio::test]
    async fn test_help() {
        let (_, s) = services();
        let all = s.execute(&Command::Help(String::new()), "1").await.unwrap();
        assert!(all.contains("/resetchat"));

        let one = s.execute(&Command::Help("qa".into()), "1").await.unwrap();
        assert!(one.contains("Help: /qa"));

        let missing = s.execute(&Command::Help("dance".into()), "1").await.unwrap();
        assert!(missing.contains("Command <code>dance</code> not found"));
    }

    #[tokio::test]
    async fn test_purge_needs_a_chat() {
        let (_, s) = services();
        let err = s.execute(&Command::Purge("5".into()), "1").await.unwrap_err();
        assert!(matches!(err, CommandError::Usage(_)));
    }
}

// =============================================================================
// MODEL FAILURES
// =============================================================================

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_load_failure_reported_then_retried() {
        let (provider, s) = services_with(StubProvider::default().failing(ModelKind::Sentiment, 1));

        let err = s.execute(&Command::Analyze("good".into()), "1").await.unwrap_err();
        assert!(matches!(err, CommandError::Model(_)));
        assert!(err.user_message().starts_with("❌ An error occurred: failed to load Sentiment Analyzer"));

        let out = s.execute(&Command::Analyze("good".into()), "1").await.unwrap();
        assert!(out.contains("POSITIVE"));
        assert_eq!(provider.constructions(ModelKind::Sentiment), 2);
    }

    #[tokio::test]
    async fn test_dialogue_failure_leaves_no_session() {
        let (_, s) = services_with(StubProvider::default().failing(ModelKind::Dialogue, 1));
        assert!(s.execute(&Command::Chat("hi".into()), "1").await.is_err());
        let out = s.execute(&Command::Resetchat, "1").await.unwrap();
        assert_eq!(out, "You don't have an active conversation.");
    }
}
