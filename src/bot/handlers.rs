//! Model-backed command handlers, independent of Telegram.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::bot::commands::{find_command, parse_qa, require_text, Command, CommandError};
use crate::bot::format;
use crate::config::{ChatSettings, Config, GenerationSettings, ModerationSettings};
use crate::models::pipelines::BertProvider;
use crate::models::{run_blocking, ContentModerator, ModelProvider};
use crate::registry::ModelRegistry;
use crate::sessions::SessionStore;

/// Everything a command needs: the model registry, chat sessions and the
/// per-command settings.
pub struct Services {
    registry: ModelRegistry,
    sessions: Arc<SessionStore>,
    moderation: ModerationSettings,
    generation: GenerationSettings,
}

impl Services {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        moderation: ModerationSettings,
        generation: GenerationSettings,
        chat: &ChatSettings,
    ) -> Self {
        let idle_timeout = match chat.idle_timeout_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(minutes * 60)),
        };
        Self {
            registry: ModelRegistry::new(provider),
            sessions: Arc::new(SessionStore::new(chat.max_turns, idle_timeout)),
            moderation,
            generation,
        }
    }

    /// Services backed by the rust-bert pipelines.
    pub fn from_config(config: &Config) -> Self {
        let provider = BertProvider::new(config.moderation.model.clone(), config.chat.clone());
        Self::new(
            Arc::new(provider),
            config.moderation.clone(),
            config.generation.clone(),
            &config.chat,
        )
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Run a command for `user_id` and render the reply as Telegram HTML.
    pub async fn execute(&self, command: &Command, user_id: &str) -> Result<String, CommandError> {
        match command {
            Command::Analyze(arg) => self.analyze(require_text(arg, "analyze")?).await,
            Command::Chat(arg) => self.chat(user_id, require_text(arg, "chat")?).await,
            Command::Resetchat => Ok(self.reset_chat(user_id).await),
            Command::Moderate(arg) => self.moderate(require_text(arg, "moderate")?).await,
            Command::Generate(arg) => self.generate(require_text(arg, "generate")?).await,
            Command::Qa(arg) => {
                let (context, question) = parse_qa(arg)?;
                self.answer(context, question).await
            }
            Command::Models => Ok(format::models(|kind| self.registry.is_loaded(kind))),
            Command::Help(arg) => Ok(help(arg)),
            Command::Purge(_) | Command::Clear(_) => Err(CommandError::Usage(
                "⚠️ This command only works inside a chat.".to_string(),
            )),
        }
    }

    async fn analyze(&self, text: &str) -> Result<String, CommandError> {
        let analyzer = self.registry.sentiment().await?;
        let input = text.to_string();
        let result = run_blocking(move || analyzer.classify_one(&input)).await?;
        Ok(format::sentiment(text, &result))
    }

    async fn chat(&self, user_id: &str, message: &str) -> Result<String, CommandError> {
        let reply = self.sessions.respond(user_id, message, &self.registry).await?;
        Ok(format::chat_reply(&reply))
    }

    async fn reset_chat(&self, user_id: &str) -> String {
        if self.sessions.reset(user_id).await {
            "✅ Your conversation history has been reset!".to_string()
        } else {
            "You don't have an active conversation.".to_string()
        }
    }

    async fn moderate(&self, text: &str) -> Result<String, CommandError> {
        let classifier = self.registry.moderation().await?;
        let moderator = ContentModerator::new(classifier, &self.moderation.flag_labels);
        let threshold = self.moderation.threshold;
        let input = text.to_string();
        let verdict = run_blocking(move || moderator.check(&input, threshold)).await?;
        if verdict.is_inappropriate {
            info!("Flagged text as {} ({:.2})", verdict.label, verdict.confidence);
        }
        Ok(format::moderation(&verdict))
    }

    async fn generate(&self, prompt: &str) -> Result<String, CommandError> {
        let generator = self.registry.generator().await?;
        let options = self.generation.options();
        let input = prompt.to_string();
        let generated = run_blocking(move || generator.generate_one(&input, &options)).await?;
        Ok(format::generation(prompt, &generated))
    }

    async fn answer(&self, context: &str, question: &str) -> Result<String, CommandError> {
        let qa = self.registry.question_answering().await?;
        let (q, c) = (question.to_string(), context.to_string());
        let answer = run_blocking(move || qa.answer(&q, &c)).await?;
        Ok(format::answer(context, question, answer.as_ref()))
    }
}

fn help(arg: &str) -> String {
    let name = arg.trim();
    if name.is_empty() {
        return format::help_overview();
    }
    match find_command(name) {
        Some(info) => format::help_for(info),
        None => format::help_not_found(name),
    }
}
