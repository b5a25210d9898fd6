//! Telegram HTML rendering of model results.
//!
//! User and model text is escaped so `<`, `>`, `&` become `&lt;`, `&gt;`,
//! `&amp;`; everything else is our own markup.

use crate::bot::commands::{CommandInfo, COMMANDS};
use crate::models::{Answer, Classification, ModelKind, ModerationVerdict};

/// Telegram's limit on message length.
pub const MAX_MESSAGE_CHARS: usize = 4096;

const MAX_TEXT_CHARS: usize = 1000;
const MAX_PROMPT_CHARS: usize = 500;
const MAX_CONTEXT_CHARS: usize = 500;

/// Escape a string for Telegram HTML.
pub fn escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            _ => result.push(c),
        }
    }
    result
}

/// First `max_chars` characters, with "..." when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_string(),
    }
}

/// Truncate then escape.
fn field(s: &str, max_chars: usize) -> String {
    escape(&truncate_chars(s, max_chars))
}

/// `0.9987` -> `99.87%`.
pub fn percent(score: f64) -> String {
    format!("{:.2}%", score * 100.0)
}

pub fn sentiment(text: &str, result: &Classification) -> String {
    format!(
        "📊 <b>Sentiment Analysis</b>\n\n\
         <b>Text:</b> {}\n\
         <b>Sentiment:</b> {}\n\
         <b>Confidence:</b> {}",
        field(text, MAX_TEXT_CHARS),
        escape(&result.label),
        percent(result.score),
    )
}

pub fn moderation(verdict: &ModerationVerdict) -> String {
    if verdict.is_inappropriate {
        format!(
            "⚠️ <b>Content Moderation</b>\n\n\
             <b>Status:</b> INAPPROPRIATE\n\
             <b>Confidence:</b> {}\n\
             <b>Reason:</b> This content may be toxic or offensive",
            percent(verdict.confidence),
        )
    } else {
        format!(
            "✅ <b>Content Moderation</b>\n\n\
             <b>Status:</b> APPROPRIATE\n\
             <b>Confidence:</b> {}",
            percent(verdict.confidence),
        )
    }
}

pub fn generation(prompt: &str, generated: &str) -> String {
    format!(
        "✨ <b>Text Generation</b>\n\n\
         <b>Prompt:</b> {}\n\
         <b>Generated Text:</b> {}",
        field(prompt, MAX_PROMPT_CHARS),
        field(generated, MAX_TEXT_CHARS),
    )
}

pub fn answer(context: &str, question: &str, answer: Option<&Answer>) -> String {
    let answer = match answer {
        Some(a) if !a.answer.trim().is_empty() => {
            format!("{} <i>(confidence {})</i>", escape(&a.answer), percent(a.score))
        }
        _ => "<i>No answer found in the context.</i>".to_string(),
    };
    format!(
        "❓ <b>Question Answering</b>\n\n\
         <b>Context:</b> {}\n\
         <b>Question:</b> {}\n\
         <b>Answer:</b> {}",
        field(context, MAX_CONTEXT_CHARS),
        field(question, MAX_TEXT_CHARS),
        answer,
    )
}

/// A dialogue reply. Telegram rejects empty messages.
pub fn chat_reply(reply: &str) -> String {
    let reply = reply.trim();
    if reply.is_empty() {
        return "🤔 <i>(no reply)</i>".to_string();
    }
    field(reply, MAX_MESSAGE_CHARS - 100)
}

/// `/models` listing, marking which models are already resident.
pub fn models(is_loaded: impl Fn(ModelKind) -> bool) -> String {
    let mut out = String::from("🤖 <b>Available ML Models</b>\n\nHere are all the AI models available in this bot:\n");
    for kind in ModelKind::ALL {
        let (emoji, command, summary) = match kind {
            ModelKind::Sentiment => ("📊", "analyze", "Detects emotions and sentiment in text"),
            ModelKind::Dialogue => ("💬", "chat", "Conversational AI that remembers context"),
            ModelKind::Moderation => ("⚠️", "moderate", "Detects toxic or inappropriate content"),
            ModelKind::Generation => ("✨", "generate", "Generates creative text from prompts"),
            ModelKind::QuestionAnswering => ("❓", "qa", "Answers questions based on context"),
        };
        let state = if is_loaded(kind) { "loaded" } else { "loads on first use" };
        out.push_str(&format!(
            "\n{emoji} <b>{kind}</b> (/{command})\n{summary} <i>[{state}]</i>\n"
        ));
    }
    out
}

pub fn help_overview() -> String {
    let mut out = String::from(
        "📚 <b>Sive ML Bot - Commands</b>\n\n\
         Here are all available commands. Use <code>/help &lt;command&gt;</code> for more details.\n",
    );
    for info in COMMANDS {
        out.push_str(&format!(
            "\n{} <b>{}</b>\n{}\n",
            info.emoji,
            escape(info.usage),
            info.summary
        ));
    }
    out.push_str("\n<i>Powered by rust-bert 🤗</i>");
    out
}

pub fn help_for(info: &CommandInfo) -> String {
    format!(
        "ℹ️ <b>Help: /{}</b>\n\n{}\nUsage: <code>{}</code>",
        info.name,
        info.summary,
        escape(info.usage)
    )
}

pub fn help_not_found(name: &str) -> String {
    format!(
        "⚠️ Command <code>{}</code> not found. Use /help to see all commands.",
        field(name, 64)
    )
}
