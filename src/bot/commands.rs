//! Command surface and argument parsing.

use std::fmt;

use teloxide::utils::command::BotCommands;

use crate::models::ModelError;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Sive ML bot commands:")]
pub enum Command {
    #[command(description = "analyze sentiment of text")]
    Analyze(String),
    #[command(description = "chat with an AI that remembers your conversation")]
    Chat(String),
    #[command(description = "reset your conversation history")]
    Resetchat,
    #[command(description = "check if text is inappropriate")]
    Moderate(String),
    #[command(description = "generate text from a prompt")]
    Generate(String),
    #[command(description = "answer a question: /qa <context> | <question>")]
    Qa(String),
    #[command(description = "show the available ML models")]
    Models,
    #[command(description = "show help, or help for one command")]
    Help(String),
    #[command(description = "delete recent messages in this chat (needs delete rights)")]
    Purge(String),
    #[command(description = "delete your own recent messages")]
    Clear(String),
}

impl Command {
    /// Whether running the command involves model inference.
    pub fn uses_model(&self) -> bool {
        matches!(
            self,
            Command::Analyze(_)
                | Command::Chat(_)
                | Command::Moderate(_)
                | Command::Generate(_)
                | Command::Qa(_)
        )
    }

    /// Check the argument without running anything.
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            Command::Analyze(arg) => require_text(arg, "analyze").map(drop),
            Command::Chat(arg) => require_text(arg, "chat").map(drop),
            Command::Moderate(arg) => require_text(arg, "moderate").map(drop),
            Command::Generate(arg) => require_text(arg, "generate").map(drop),
            Command::Qa(arg) => parse_qa(arg).map(drop),
            Command::Purge(arg) | Command::Clear(arg) => parse_amount(arg).map(drop),
            Command::Resetchat | Command::Models | Command::Help(_) => Ok(()),
        }
    }

    /// Show "typing..." only when a model will actually run.
    pub fn shows_typing(&self) -> bool {
        self.uses_model() && self.validate().is_ok()
    }
}

/// Static usage text for `/help`.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandInfo {
    pub emoji: &'static str,
    pub name: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
}

pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo { emoji: "📊", name: "analyze", usage: "/analyze <text>", summary: "Analyze sentiment and emotions in text" },
    CommandInfo { emoji: "💬", name: "chat", usage: "/chat <message>", summary: "Chat with AI that remembers your conversation" },
    CommandInfo { emoji: "🔄", name: "resetchat", usage: "/resetchat", summary: "Reset your conversation history" },
    CommandInfo { emoji: "🗑️", name: "purge", usage: "/purge <amount>", summary: "Delete messages from this chat (requires the delete messages right)" },
    CommandInfo { emoji: "🧹", name: "clear", usage: "/clear <amount>", summary: "Delete only your own messages" },
    CommandInfo { emoji: "⚠️", name: "moderate", usage: "/moderate <text>", summary: "Check if content is toxic or inappropriate" },
    CommandInfo { emoji: "✨", name: "generate", usage: "/generate <prompt>", summary: "Generate creative text from a prompt" },
    CommandInfo { emoji: "❓", name: "qa", usage: "/qa <context> | <question>", summary: "Answer questions based on provided context" },
    CommandInfo { emoji: "🤖", name: "models", usage: "/models", summary: "Show all available ML models" },
    CommandInfo { emoji: "ℹ️", name: "help", usage: "/help [command]", summary: "Show this help message or help for a specific command" },
];

/// Look up a command by name, with or without the leading slash.
pub fn find_command(name: &str) -> Option<&'static CommandInfo> {
    let name = name.trim().trim_start_matches('/').to_lowercase();
    COMMANDS.iter().find(|c| c.name == name)
}

pub const DEFAULT_AMOUNT: u32 = 10;
pub const MAX_AMOUNT: u32 = 100;

/// Why a command could not be completed.
#[derive(Debug)]
pub enum CommandError {
    /// Missing or malformed argument. Holds the warning shown to the user.
    Usage(String),
    /// Caller lacks a chat permission.
    Permission(String),
    /// Telegram refused or failed the request.
    Platform(String),
    /// Model construction or inference failed.
    Model(ModelError),
}

impl CommandError {
    pub fn missing_argument(command: &str) -> Self {
        Self::Usage(format!(
            "⚠️ Missing required argument. Use <code>/help {command}</code> for usage info."
        ))
    }

    /// Text shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Usage(msg) | Self::Permission(msg) | Self::Platform(msg) => msg.clone(),
            Self::Model(e) => format!("❌ An error occurred: {}", super::format::escape(&e.to_string())),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(msg) => write!(f, "usage error: {msg}"),
            Self::Permission(msg) => write!(f, "permission denied: {msg}"),
            Self::Platform(msg) => write!(f, "platform error: {msg}"),
            Self::Model(e) => write!(f, "model error: {e}"),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Model(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ModelError> for CommandError {
    fn from(e: ModelError) -> Self {
        Self::Model(e)
    }
}

/// Trimmed free-text argument, required to be non-empty.
pub fn require_text<'a>(arg: &'a str, command: &str) -> Result<&'a str, CommandError> {
    let text = arg.trim();
    if text.is_empty() {
        return Err(CommandError::missing_argument(command));
    }
    Ok(text)
}

/// Split `<context> | <question>` on the first `|`. Later `|` characters
/// stay in the question.
pub fn parse_qa(arg: &str) -> Result<(&str, &str), CommandError> {
    let usage = || {
        CommandError::Usage(
            "⚠️ Please use format: <code>/qa &lt;context&gt; | &lt;question&gt;</code>\n\
             Example: <code>/qa AI is artificial intelligence | What is AI?</code>"
                .to_string(),
        )
    };
    let (context, question) = arg.split_once('|').ok_or_else(usage)?;
    let (context, question) = (context.trim(), question.trim());
    if context.is_empty() || question.is_empty() {
        return Err(usage());
    }
    Ok((context, question))
}

/// Amount for `/purge` and `/clear`: 1..=100, default 10.
pub fn parse_amount(arg: &str) -> Result<u32, CommandError> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Ok(DEFAULT_AMOUNT);
    }
    match arg.parse::<i64>() {
        Ok(n) if (1..=MAX_AMOUNT as i64).contains(&n) => Ok(n as u32),
        _ => Err(CommandError::Usage("⚠️ Please specify a number between 1 and 100.".to_string())),
    }
}
