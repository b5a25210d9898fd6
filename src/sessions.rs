//! Per-user conversation sessions for `/chat`.
//!
//! One session per user id. A session is locked for the whole of a turn, so
//! two messages from the same user are answered one after the other while
//! different users proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::{run_blocking, Dialogue, DialogueHistory, ModelError};
use crate::registry::ModelRegistry;

/// A user's dialogue model handle and running context.
pub struct Session {
    model: Arc<dyn Dialogue>,
    history: DialogueHistory,
    last_active: Instant,
    /// Set when the sweeper drops the session from the store.
    evicted: bool,
}

impl Session {
    pub fn history(&self) -> &DialogueHistory {
        &self.history
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
    max_turns: usize,
    idle_timeout: Option<Duration>,
}

impl SessionStore {
    /// `idle_timeout` of `None` keeps sessions until reset.
    pub fn new(max_turns: usize, idle_timeout: Option<Duration>) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), max_turns, idle_timeout }
    }

    /// Get the user's session, creating it (and loading the dialogue model if
    /// needed) on first use.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        registry: &ModelRegistry,
    ) -> Result<Arc<Mutex<Session>>, ModelError> {
        if let Some(session) = self.sessions.lock().await.get(user_id) {
            return Ok(session.clone());
        }

        // Load outside the map lock; construction can take seconds.
        let model = registry.dialogue().await?;

        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(user_id.to_string()).or_insert_with(|| {
            info!("💬 New chat session for user {user_id}");
            Arc::new(Mutex::new(Session {
                model,
                history: DialogueHistory::new(self.max_turns),
                last_active: Instant::now(),
                evicted: false,
            }))
        });
        Ok(session.clone())
    }

    /// Reply to `text` in the user's conversation and remember the exchange.
    pub async fn respond(
        &self,
        user_id: &str,
        text: &str,
        registry: &ModelRegistry,
    ) -> Result<String, ModelError> {
        let session = self.get_or_create(user_id, registry).await?;
        self.respond_in(session, user_id, text, registry).await
    }

    /// Run a turn in `session`. If the sweeper evicted it between lookup and
    /// lock, the turn goes to the user's current session instead.
    async fn respond_in(
        &self,
        mut session: Arc<Mutex<Session>>,
        user_id: &str,
        text: &str,
        registry: &ModelRegistry,
    ) -> Result<String, ModelError> {
        let mut session = loop {
            let guard = session.clone().lock_owned().await;
            if !guard.evicted {
                break guard;
            }
            drop(guard);
            debug!("Session for user {user_id} was evicted before its turn; looking up again");
            session = self.get_or_create(user_id, registry).await?;
        };

        let model = session.model.clone();
        let history = session.history.clone();
        let input = text.to_string();
        let turn = run_blocking(move || model.respond(&history, &input)).await?;

        let reply = turn.reply.clone();
        session.history.push(turn);
        session.last_active = Instant::now();
        debug!("User {user_id} session now holds {} turn(s)", session.history.len());
        Ok(reply)
    }

    /// Clear the user's context. Returns whether a session existed.
    pub async fn reset(&self, user_id: &str) -> bool {
        let session = self.sessions.lock().await.get(user_id).cloned();
        match session {
            Some(session) => {
                let mut session = session.lock().await;
                session.history.clear();
                session.last_active = Instant::now();
                info!("🔄 Reset chat session for user {user_id}");
                true
            }
            None => false,
        }
    }

    /// Drop sessions idle for longer than the timeout. Sessions mid-turn are
    /// skipped. Returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let Some(timeout) = self.idle_timeout else {
            return 0;
        };
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| match session.try_lock() {
            Ok(mut s) => {
                let keep = now.duration_since(s.last_active) < timeout;
                s.evicted = !keep;
                keep
            }
            Err(_) => true,
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!("🧹 Evicted {evicted} idle chat session(s)");
        }
        evicted
    }

    /// Periodically evict idle sessions. No-op without a timeout.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let Some(timeout) = self.idle_timeout else {
            return;
        };
        let store = Arc::downgrade(self);
        let period = (timeout / 4).clamp(Duration::from_secs(1), Duration::from_secs(600));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.evict_idle().await;
            }
        });
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
