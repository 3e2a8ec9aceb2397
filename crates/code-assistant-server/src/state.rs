use std::sync::Arc;
use anyhow::Result;
use axum::extract::FromRef;

use crate::config::Settings;
use crate::logging::ActivityLogger;
use crate::services::conversation::{
    build_token_counter, CompletionProvider, ContextBuilder, ConversationManager, SessionStore,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub conversation_manager: Arc<ConversationManager>,
}

impl AppState {
    /// Wire the conversation services from settings. Must run inside a
    /// tokio runtime when activity logging is enabled.
    pub fn new(settings: Settings, llm_provider: Arc<dyn CompletionProvider>) -> Result<Self> {
        let conv = &settings.conversation;

        let store = SessionStore::new(conv.max_history_turns, conv.session_ttl());
        let context_builder = ContextBuilder::new(
            settings.prompts.system_prompt.clone(),
            conv.max_context_tokens,
            build_token_counter(conv.tokenizer)?,
        );
        let logger = ActivityLogger::new(&settings.activity_log);

        let conversation_manager = Arc::new(ConversationManager::new(
            store,
            context_builder,
            llm_provider,
            logger,
        ));

        Ok(Self {
            settings: Arc::new(settings),
            conversation_manager,
        })
    }
}

impl FromRef<AppState> for Arc<ConversationManager> {
    fn from_ref(state: &AppState) -> Self {
        state.conversation_manager.clone()
    }
}
