//! Telegram client using teloxide.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{BotCommandScope, ChatAction, MessageId, ParseMode, ReplyParameters};
use teloxide::utils::command::BotCommands;
use teloxide::{ApiError, RequestError};
use tracing::{info, warn};

use crate::bot::commands::{Command, CommandError};

/// Telegram accepts at most this many ids per deleteMessages call.
const DELETE_BATCH: usize = 100;

/// Telegram API client.
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Send HTML text, optionally as a reply. Returns the new message id.
    pub async fn send_html(
        &self,
        chat_id: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId, RequestError> {
        let mut request = self.bot.send_message(chat_id, text).parse_mode(ParseMode::Html);

        if let Some(msg_id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(msg_id));
        }

        request.await.map(|msg| msg.id).inspect_err(|e| warn!("Failed to send: {e}"))
    }

    /// Show "typing..." while a model works.
    pub async fn typing(&self, chat_id: ChatId) {
        if let Err(e) = self.bot.send_chat_action(chat_id, ChatAction::Typing).await {
            warn!("Failed to send typing action: {e}");
        }
    }

    /// Whether the user may delete other people's messages in the chat.
    pub async fn can_delete_messages(&self, chat_id: ChatId, user_id: UserId) -> Result<bool, RequestError> {
        let member = self.bot.get_chat_member(chat_id, user_id).await?;
        Ok(member.kind.can_delete_messages())
    }

    /// Delete messages in batches. Ids that no longer exist are ignored by
    /// Telegram.
    pub async fn delete_messages(&self, chat_id: ChatId, ids: &[MessageId]) -> Result<(), RequestError> {
        info!("🗑️ Deleting {} message(s) in chat {}", ids.len(), chat_id);
        for batch in ids.chunks(DELETE_BATCH) {
            self.bot.delete_messages(chat_id, batch.to_vec()).await?;
        }
        Ok(())
    }

    /// Delete a message after `delay`, in the background.
    pub fn delete_later(&self, chat_id: ChatId, message_id: MessageId, delay: Duration) {
        let bot = self.bot.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = bot.delete_message(chat_id, message_id).await {
                warn!("Failed to delete confirmation {}: {e}", message_id.0);
            }
        });
    }

    /// Publish the command menu shown by Telegram clients.
    pub async fn register_commands(&self) {
        if let Err(e) = self
            .bot
            .set_my_commands(Command::bot_commands())
            .scope(BotCommandScope::Default)
            .await
        {
            warn!("Failed to register bot commands: {e}");
        }
    }
}

/// Map a failed deletion to the message shown to the user.
pub fn deletion_error(e: RequestError) -> CommandError {
    match e {
        RequestError::Api(ApiError::MessageCantBeDeleted) => CommandError::Platform(
            "❌ I don't have permission to delete messages in this chat.".to_string(),
        ),
        other => CommandError::Platform(format!(
            "❌ An error occurred while deleting messages: {}",
            crate::bot::format::escape(&other.to_string())
        )),
    }
}

/// Ids from `newest - amount` up to and including `newest`, skipping ids
/// that cannot exist.
pub fn purge_range(newest: MessageId, amount: u32) -> Vec<MessageId> {
    let lowest = (newest.0 - amount as i32).max(1);
    (lowest..=newest.0).map(MessageId).collect()
}
