pub mod settings;

pub use settings::{
    ActivityLogConfig, ConversationConfig, LlmConfig, LoggingConfig, PromptsConfig, ServerConfig,
    Settings, TokenizerKind,
};
