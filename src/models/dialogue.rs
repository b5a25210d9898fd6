//! Turn-based conversational model and its running context.

use std::collections::VecDeque;

use super::ModelError;

/// One exchange: what the user said, what the model replied, and the token
/// ids the model recorded for that exchange.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DialogueTurn {
    pub user: String,
    pub reply: String,
    pub tokens: Vec<Vec<i64>>,
}

/// Conversation context, bounded to the most recent `max_turns` turns.
#[derive(Debug, Clone)]
pub struct DialogueHistory {
    turns: VecDeque<DialogueTurn>,
    max_turns: usize,
}

impl DialogueHistory {
    pub fn new(max_turns: usize) -> Self {
        Self { turns: VecDeque::new(), max_turns: max_turns.max(1) }
    }

    /// Record a turn, dropping the oldest ones past the bound.
    pub fn push(&mut self, turn: DialogueTurn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> impl Iterator<Item = &DialogueTurn> {
        self.turns.iter()
    }

    pub fn user_inputs(&self) -> Vec<String> {
        self.turns.iter().map(|t| t.user.clone()).collect()
    }

    pub fn replies(&self) -> Vec<String> {
        self.turns.iter().map(|t| t.reply.clone()).collect()
    }

    /// Token ids of all retained turns, oldest first.
    pub fn token_history(&self) -> Vec<Vec<i64>> {
        self.turns.iter().flat_map(|t| t.tokens.iter().cloned()).collect()
    }
}

impl Default for DialogueHistory {
    fn default() -> Self {
        Self::new(8)
    }
}

/// A conversational model. The model itself is shared; the context lives in
/// the caller's [`DialogueHistory`].
pub trait Dialogue: Send + Sync {
    /// Produce the next turn given the prior context and the new input.
    fn respond(&self, history: &DialogueHistory, input: &str) -> Result<DialogueTurn, ModelError>;

    /// One-off reply that ignores any conversation.
    fn respond_no_history(&self, input: &str) -> Result<String, ModelError> {
        Ok(self.respond(&DialogueHistory::default(), input)?.reply)
    }
}
