use crate::services::conversation::ConversationManager;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    active_sessions: usize,
    stored_turns: usize,
}

pub async fn health_check(
    State(manager): State<Arc<ConversationManager>>,
) -> (StatusCode, Json<HealthResponse>) {
    let stats = manager.store().stats();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            active_sessions: stats.active_sessions,
            stored_turns: stats.stored_turns,
        }),
    )
}
