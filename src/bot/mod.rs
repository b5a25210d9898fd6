//! Bot module - Telegram commands in front of the NLP pipelines.

pub mod commands;
pub mod dispatch;
pub mod format;
pub mod handlers;
pub mod message_log;
pub mod telegram;

#[cfg(test)]
mod tests;

pub use commands::{Command, CommandError};
pub use dispatch::{schema, BotState};
pub use handlers::Services;
pub use telegram::TelegramClient;
