use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use code_assistant_server::config::Settings;
use code_assistant_server::routes::build_router;
use code_assistant_server::services::conversation::spawn_session_sweeper;
use code_assistant_server::services::LlmService;
use code_assistant_server::state::AppState;
use code_assistant_server::utils::logger::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    let _log_guard = init_logger(&settings.logging)?;

    info!("🚀 Starting Code Assistant Server...");
    info!(
        "✅ Configuration loaded (model={}, max_context_tokens={}, max_history_turns={})",
        settings.llm.model,
        settings.conversation.max_context_tokens,
        settings.conversation.max_history_turns
    );

    if settings.llm.api_key.is_empty() {
        warn!("llm.api_key is empty; upstream calls will be rejected (set APP__LLM__API_KEY)");
    }

    // Initialize services
    let llm_service = Arc::new(LlmService::new(settings.llm.clone())?);
    let state = AppState::new(settings, llm_service)?;

    let conv = &state.settings.conversation;
    if spawn_session_sweeper(
        state.conversation_manager.clone(),
        Duration::from_secs(conv.cleanup_interval_seconds),
    )
    .is_none()
    {
        info!("Session expiry disabled; sessions live for the process lifetime");
    }

    // Server address
    let addr = SocketAddr::from((
        state.settings.server.host.parse::<std::net::IpAddr>()?,
        state.settings.server.port,
    ));

    let app = build_router(state);

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
