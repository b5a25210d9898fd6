//! Recently seen messages, per chat, for `/clear`.
//!
//! Telegram gives bots no way to list chat history, so we remember the ids
//! and authors of messages as they arrive. Bounded per chat.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

/// Telegram refuses to delete messages older than this.
pub const DELETE_WINDOW_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggedMessage {
    pub message_id: i32,
    pub user_id: u64,
    pub sent_at: DateTime<Utc>,
}

pub struct MessageLog {
    chats: HashMap<i64, VecDeque<LoggedMessage>>,
    per_chat: usize,
}

impl MessageLog {
    pub fn new(per_chat: usize) -> Self {
        Self { chats: HashMap::new(), per_chat: per_chat.max(1) }
    }

    /// Remember a message, forgetting the oldest one in the chat when full.
    pub fn record(&mut self, chat_id: i64, msg: LoggedMessage) {
        let log = self.chats.entry(chat_id).or_default();
        log.push_back(msg);
        while log.len() > self.per_chat {
            log.pop_front();
        }
    }

    /// Ids of `user_id`'s newest messages in the chat that are still inside
    /// the delete window, newest first, at most `limit`.
    pub fn recent_from(&self, chat_id: i64, user_id: u64, limit: usize, now: DateTime<Utc>) -> Vec<i32> {
        let cutoff = now - Duration::hours(DELETE_WINDOW_HOURS);
        self.chats
            .get(&chat_id)
            .map(|log| {
                log.iter()
                    .rev()
                    .filter(|m| m.user_id == user_id && m.sent_at > cutoff)
                    .take(limit)
                    .map(|m| m.message_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop deleted messages.
    pub fn forget(&mut self, chat_id: i64, message_ids: &[i32]) {
        if let Some(log) = self.chats.get_mut(&chat_id) {
            log.retain(|m| !message_ids.contains(&m.message_id));
        }
    }

    pub fn len(&self, chat_id: i64) -> usize {
        self.chats.get(&chat_id).map(VecDeque::len).unwrap_or(0)
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(1000)
    }
}
