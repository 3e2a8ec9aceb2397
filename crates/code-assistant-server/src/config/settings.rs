use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub conversation: ConversationConfig,
    pub prompts: PromptsConfig,
    pub logging: LoggingConfig,
    pub activity_log: ActivityLogConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    /// Base of the OpenAI-compatible API; `/chat/completions` is appended
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/v1".to_string(),
            api_key: String::new(),
            model: "deepseek-reasoner".to_string(),
            temperature: 0.3,
            max_tokens: 2048,
            timeout_seconds: 30,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    #[serde(rename = "cl100k_base")]
    Cl100kBase,
    Heuristic,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConversationConfig {
    /// Token ceiling for system prompt + history + query
    pub max_context_tokens: usize,
    /// Turns retained per session (10 exchanges)
    pub max_history_turns: usize,
    /// Idle time before a session is evicted; 0 keeps sessions for the process lifetime
    pub session_ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
    pub tokenizer: TokenizerKind,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 8192,
            max_history_turns: 20,
            session_ttl_seconds: 0,
            cleanup_interval_seconds: 300,
            tokenizer: TokenizerKind::Cl100kBase,
        }
    }
}

impl ConversationConfig {
    pub fn session_ttl(&self) -> Option<Duration> {
        (self.session_ttl_seconds > 0).then(|| Duration::from_secs(self.session_ttl_seconds))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    pub system_prompt: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a professional code assistant. Produce code with detailed \
                comments and wrap every code snippet in a fenced code block."
                .to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// EnvFilter directive, overridden by RUST_LOG when set
    pub level: String,
    /// "json" or "pretty"
    pub format: String,
    /// Optional directory for a daily rolling log file
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,code_assistant_server=debug".to_string(),
            format: "json".to_string(),
            directory: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ActivityLogConfig {
    pub enabled: bool,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub worker_count: usize,
}

impl Default for ActivityLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 10_000,
            batch_size: 100,
            batch_timeout_ms: 1000,
            worker_count: 1,
        }
    }
}

impl Settings {
    /// Defaults, then `config/settings.toml` if present, then `APP__SECTION__KEY` env vars.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}
