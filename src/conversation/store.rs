//! ConversationStore: the bounded turn log that forms the prompt context.

use crate::error::{ConversationError, Result};

use serde::{Deserialize, Serialize};

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One message in the conversation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Ordered turn log. Index 0 is always the persona (system) turn and is
/// never evicted; the rest is capped at `2 * history_limit` turns.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    turns: Vec<Turn>,
    history_limit: usize,
}

impl ConversationStore {
    pub fn new(persona: impl Into<String>, history_limit: usize) -> Self {
        Self {
            turns: vec![Turn::system(persona)],
            history_limit,
        }
    }

    pub fn persona(&self) -> &str {
        self.turns[0].content()
    }

    /// Swap the persona turn, keeping the user/assistant history.
    pub fn replace_persona(&mut self, persona: impl Into<String>) {
        self.turns[0] = Turn::system(persona);
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Change the pair limit and immediately re-apply the bound.
    pub fn set_history_limit(&mut self, history_limit: usize) {
        self.history_limit = history_limit;
        self.enforce_bound();
    }

    pub fn append_user(&mut self, text: impl Into<String>) -> Result<()> {
        self.append(Turn::user(text))
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) -> Result<()> {
        self.append(Turn::assistant(text))
    }

    fn append(&mut self, turn: Turn) -> Result<()> {
        if turn.content.trim().is_empty() {
            return Err(ConversationError::InvalidTurn {
                role: turn.role.as_str(),
            }
            .into());
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Evict the oldest turns until the log fits `2 * history_limit + 1`
    /// turns. Returns the number of evicted turns.
    ///
    /// A user turn answered by the next turn goes with its answer. An
    /// unanswered user turn (left by a failed call) or a stray assistant
    /// turn goes alone, so the history after the persona keeps starting
    /// with a user question.
    pub fn enforce_bound(&mut self) -> usize {
        let capacity = self.history_limit * 2 + 1;
        let mut evicted = 0;

        while self.turns.len() > capacity {
            let answered = self.turns[1].role == Role::User
                && self
                    .turns
                    .get(2)
                    .is_some_and(|turn| turn.role == Role::Assistant);
            let end = if answered { 3 } else { 2 };
            self.turns.drain(1..end);
            evicted += end - 1;
        }

        if evicted > 0 {
            tracing::debug!(
                evicted,
                pairs = self.pair_count(),
                limit = self.history_limit,
                "history limit exceeded, evicted oldest turns"
            );
        }

        evicted
    }

    /// The last `n` non-system turns, oldest first. The iterator borrows the
    /// store, is `Clone` (restartable) and never mutates anything.
    pub fn recent_window(&self, n: usize) -> std::slice::Iter<'_, Turn> {
        let history = &self.turns[1..];
        let start = history.len().saturating_sub(n);
        history[start..].iter()
    }

    /// All turns, persona first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Total turn count including the persona.
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn pair_count(&self) -> usize {
        (self.turns.len() - 1) / 2
    }

    /// Drop all user/assistant turns, keeping the persona.
    pub fn clear(&mut self) {
        self.turns.truncate(1);
    }
}
