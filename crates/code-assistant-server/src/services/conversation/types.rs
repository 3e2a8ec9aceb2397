use std::time::Duration;
use tokio::time::Instant;

use crate::models::chat::{ChatMessage, SessionId};

/// Per-session state held by the store
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: SessionId,

    /// Chronological turns, appended in user/assistant pairs
    pub messages: Vec<ChatMessage>,

    pub created_at: Instant,

    /// Refreshed on every read through `get_or_create` and every append
    pub last_activity: Instant,

    pub metadata: SessionMetadata,
}

impl SessionState {
    pub fn new(session_id: SessionId) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            messages: Vec::with_capacity(20),
            created_at: now,
            last_activity: now,
            metadata: SessionMetadata::default(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_idle_for(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activity) > ttl
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    /// Exchanges ever recorded, including ones since trimmed away
    pub total_exchanges: usize,

    /// Turns dropped by the history trimmer
    pub trimmed_turns: usize,
}

/// Assembled request context for one completion call
#[derive(Debug, Clone)]
pub struct ContextWindow {
    /// system, included history (chronological), user query
    pub messages: Vec<ChatMessage>,

    /// Tokens counted against the budget
    pub token_count: usize,

    /// Number of history turns that fit
    pub history_included: usize,
}

impl ContextWindow {
    pub fn over_budget(&self, max_context_tokens: usize) -> bool {
        self.token_count > max_context_tokens
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub active_sessions: usize,
    pub stored_turns: usize,
}
