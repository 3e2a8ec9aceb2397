use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::models::chat::{ChatMessage, SessionId};
use super::types::{SessionState, StoreStats};

/// Thread-safe in-memory session store.
///
/// Every operation holds a shard lock only for its own duration. Callers
/// that need read-then-append atomicity for one session serialize on top
/// of this (see `ConversationManager`).
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<DashMap<SessionId, SessionState>>,
    max_history_turns: usize,
    session_ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new(max_history_turns: usize, session_ttl: Option<Duration>) -> Self {
        info!(
            "Initializing session store (max_history_turns={}, ttl={:?})",
            max_history_turns, session_ttl
        );
        Self {
            storage: Arc::new(DashMap::new()),
            max_history_turns,
            session_ttl,
        }
    }

    /// Snapshot of the session history, creating an empty session if unseen
    pub fn get_or_create(&self, session_id: &str) -> Vec<ChatMessage> {
        let mut entry = self
            .storage
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("Created session {}", session_id);
                SessionState::new(session_id.to_string())
            });
        entry.touch();
        entry.messages.clone()
    }

    /// Read-only snapshot; never creates a session
    pub fn history(&self, session_id: &str) -> Option<Vec<ChatMessage>> {
        self.storage.get(session_id).map(|s| s.messages.clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.storage.contains_key(session_id)
    }

    /// Append a user/assistant pair and trim to the retained-turn limit.
    /// Returns how many turns were dropped.
    pub fn append_exchange(
        &self,
        session_id: &str,
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
    ) -> usize {
        let mut entry = self
            .storage
            .entry(session_id.to_string())
            .or_insert_with(|| SessionState::new(session_id.to_string()));

        entry.messages.push(ChatMessage::user(user_text));
        entry.messages.push(ChatMessage::assistant(assistant_text));
        entry.metadata.total_exchanges += 1;
        entry.touch();

        let dropped = entry.messages.len().saturating_sub(self.max_history_turns);
        if dropped > 0 {
            entry.messages.drain(..dropped);
            entry.metadata.trimmed_turns += dropped;
            debug!(
                "Session {} trimmed {} turns (retained {})",
                session_id,
                dropped,
                entry.messages.len()
            );
        }

        dropped
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl
    }

    /// Evict sessions idle longer than the TTL, skipping any for which
    /// `in_use` returns true. No-op when expiry is disabled.
    /// Returns the evicted session ids.
    pub fn cleanup_expired<F>(&self, now: Instant, in_use: F) -> Vec<SessionId>
    where
        F: Fn(&str) -> bool,
    {
        let Some(ttl) = self.session_ttl else {
            return Vec::new();
        };

        let mut evicted = Vec::new();
        self.storage.retain(|id, state| {
            if !state.is_idle_for(ttl, now) || in_use(id.as_str()) {
                return true;
            }

            debug!(
                "Evicting session {} (age={:?}, exchanges={}, trimmed_turns={})",
                id,
                now.saturating_duration_since(state.created_at),
                state.metadata.total_exchanges,
                state.metadata.trimmed_turns
            );
            evicted.push(id.clone());
            false
        });

        if !evicted.is_empty() {
            info!("Evicted {} idle sessions", evicted.len());
        }

        evicted
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            active_sessions: self.storage.len(),
            stored_turns: self.storage.iter().map(|s| s.messages.len()).sum(),
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(20, None)
    }
}
