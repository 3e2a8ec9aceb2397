pub mod chat;

pub use chat::{AskRequest, AskResponse, ChatMessage, Role, SessionId};
