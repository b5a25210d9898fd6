//! Telegram update handling.

use std::sync::Arc;
use std::time::Duration;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{ChatKind, MessageId};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::bot::commands::{parse_amount, Command, CommandError};
use crate::bot::handlers::Services;
use crate::bot::message_log::{LoggedMessage, MessageLog};
use crate::bot::telegram::{deletion_error, purge_range, TelegramClient};
use crate::config::Config;

/// How long purge/clear confirmations stay visible.
const CONFIRMATION_TTL: Duration = Duration::from_secs(5);

pub struct BotState {
    pub config: Config,
    pub services: Services,
    pub telegram: TelegramClient,
    pub message_log: Mutex<MessageLog>,
}

impl BotState {
    pub fn new(config: Config, services: Services, bot: Bot) -> Self {
        Self {
            config,
            services,
            telegram: TelegramClient::new(bot),
            message_log: Mutex::new(MessageLog::default()),
        }
    }

    async fn record(&self, msg: &Message) {
        if let Some(user) = &msg.from {
            let logged = LoggedMessage { message_id: msg.id.0, user_id: user.id.0, sent_at: msg.date };
            self.message_log.lock().await.record(msg.chat.id.0, logged);
        }
    }
}

/// Update handler tree: commands first, everything else is just recorded.
pub fn schema() -> UpdateHandler<teloxide::RequestError> {
    Update::filter_message()
        .branch(dptree::entry().filter_command::<Command>().endpoint(handle_command))
        .branch(dptree::endpoint(handle_message))
}

async fn handle_command(msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    if !state.config.is_allowed_chat(msg.chat.id) {
        return Ok(());
    }
    state.record(&msg).await;

    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = user.id.0.to_string();
    let username = user.username.as_deref().unwrap_or(&user.first_name);
    info!("📨 {:?} from {} ({}) in chat {}", cmd, username, user.id, msg.chat.id);

    if cmd.shows_typing() {
        state.telegram.typing(msg.chat.id).await;
    }

    let result = match &cmd {
        Command::Purge(arg) => purge(&state, &msg, arg).await,
        Command::Clear(arg) => clear(&state, &msg, user.id, arg).await,
        other => state.services.execute(other, &user_id).await.map(Some),
    };

    let text = match result {
        Ok(Some(text)) => text,
        Ok(None) => return Ok(()),
        Err(e) => {
            if let CommandError::Model(ref model_error) = e {
                error!("Command {:?} from {} failed: {model_error}", cmd, user.id);
            } else {
                info!("Command {:?} from {} rejected: {e}", cmd, user.id);
            }
            e.user_message()
        }
    };
    state.telegram.send_html(msg.chat.id, &text, Some(msg.id)).await.ok();
    Ok(())
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if !state.config.is_allowed_chat(msg.chat.id) {
        return Ok(());
    }
    state.record(&msg).await;

    let is_private = matches!(msg.chat.kind, ChatKind::Private(_));
    if is_private && msg.text().is_some_and(|t| t.starts_with('/')) {
        state
            .telegram
            .send_html(msg.chat.id, "⚠️ Command not found. Use /help to see all commands.", None)
            .await
            .ok();
    }
    Ok(())
}

/// Delete the command and the `amount` messages before it. The caller needs
/// the right to delete other members' messages.
async fn purge(state: &BotState, msg: &Message, arg: &str) -> Result<Option<String>, CommandError> {
    let amount = parse_amount(arg)?;
    let chat_id = msg.chat.id;

    if !matches!(msg.chat.kind, ChatKind::Private(_)) {
        let Some(user) = msg.from.as_ref() else {
            return Ok(None);
        };
        let allowed = state
            .telegram
            .can_delete_messages(chat_id, user.id)
            .await
            .map_err(deletion_error)?;
        if !allowed {
            return Err(CommandError::Permission(
                "❌ You don't have permission to use this command.".to_string(),
            ));
        }
    }

    let ids = purge_range(msg.id, amount);
    state.telegram.delete_messages(chat_id, &ids).await.map_err(deletion_error)?;
    forget(state, chat_id, &ids).await;

    confirm(state, chat_id, &format!("🗑️ Successfully deleted up to {amount} message(s).")).await;
    Ok(None)
}

/// Delete the command and up to `amount` of the caller's recent messages.
async fn clear(
    state: &BotState,
    msg: &Message,
    user_id: UserId,
    arg: &str,
) -> Result<Option<String>, CommandError> {
    let amount = parse_amount(arg)?;
    let chat_id = msg.chat.id;

    // The command itself is the newest logged message from the caller.
    let ids: Vec<MessageId> = state
        .message_log
        .lock()
        .await
        .recent_from(chat_id.0, user_id.0, amount as usize + 1, chrono::Utc::now())
        .into_iter()
        .map(MessageId)
        .collect();
    let deleted = ids.iter().filter(|id| **id != msg.id).count();

    state.telegram.delete_messages(chat_id, &ids).await.map_err(deletion_error)?;
    forget(state, chat_id, &ids).await;

    confirm(state, chat_id, &format!("🗑️ Successfully deleted {deleted} of your message(s).")).await;
    Ok(None)
}

async fn forget(state: &BotState, chat_id: ChatId, ids: &[MessageId]) {
    let ids: Vec<i32> = ids.iter().map(|id| id.0).collect();
    state.message_log.lock().await.forget(chat_id.0, &ids);
}

async fn confirm(state: &BotState, chat_id: ChatId, text: &str) {
    match state.telegram.send_html(chat_id, text, None).await {
        Ok(id) => state.telegram.delete_later(chat_id, id, CONFIRMATION_TTL),
        Err(e) => warn!("Failed to confirm deletion: {e}"),
    }
}
