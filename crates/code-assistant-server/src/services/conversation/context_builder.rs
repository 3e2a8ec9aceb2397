use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::chat::ChatMessage;
use super::token_counter::TokenCounter;
use super::types::ContextWindow;

/// Assembles the message list for one completion request under a token budget.
pub struct ContextBuilder {
    system_prompt: String,
    max_context_tokens: usize,
    counter: Arc<dyn TokenCounter>,
}

impl ContextBuilder {
    pub fn new(
        system_prompt: String,
        max_context_tokens: usize,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            system_prompt,
            max_context_tokens,
            counter,
        }
    }

    pub fn max_context_tokens(&self) -> usize {
        self.max_context_tokens
    }

    /// Build `[system, ...history, user(query)]`.
    ///
    /// History is walked newest to oldest and included greedily. The walk
    /// stops at the first turn that would overflow the budget, so the
    /// included history is always a contiguous, most-recent suffix. The
    /// system turn and the query are counted but never dropped: if they
    /// alone exceed the budget the window carries no history.
    pub fn build(&self, history: &[ChatMessage], query: &str) -> ContextWindow {
        let mut token_count =
            self.counter.count_text(&self.system_prompt) + self.counter.count_text(query);

        let mut included = 0;
        for msg in history.iter().rev() {
            let msg_tokens = self.counter.count_text(&msg.content);
            if token_count + msg_tokens > self.max_context_tokens {
                break;
            }
            token_count += msg_tokens;
            included += 1;
        }

        let mut messages = Vec::with_capacity(included + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend_from_slice(&history[history.len() - included..]);
        messages.push(ChatMessage::user(query));

        if token_count > self.max_context_tokens {
            warn!(
                "Query alone exceeds context budget ({} > {}), sending without history",
                token_count, self.max_context_tokens
            );
        }

        debug!(
            "Context built: {} of {} history turns, {} tokens (budget {})",
            included,
            history.len(),
            token_count,
            self.max_context_tokens
        );

        ContextWindow {
            messages,
            token_count,
            history_included: included,
        }
    }
}
