//! Conversation memory management module
//!
//! Provides in-memory session state with:
//! - Thread-safe session store (DashMap) with bounded history
//! - Token-budgeted context assembly
//! - Per-session serialized exchanges

mod cache;
mod context_builder;
pub mod manager;
mod token_counter;
pub mod types;

pub use cache::SessionStore;
pub use context_builder::ContextBuilder;
pub use manager::{spawn_session_sweeper, AskOutcome, CompletionProvider, ConversationManager};
pub use token_counter::{build_token_counter, HeuristicCounter, TiktokenCounter, TokenCounter};
pub use types::{ContextWindow, SessionState, StoreStats};

pub use crate::models::chat::{ChatMessage, SessionId};
