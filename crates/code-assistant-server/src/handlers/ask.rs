use crate::models::chat::{AskRequest, AskResponse};
use crate::services::conversation::ConversationManager;
use crate::utils::error::ApiError;
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

pub async fn ask_handler(
    State(manager): State<Arc<ConversationManager>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let session_id = request.session_id();

    info!(
        "Ask request: session={}, query_len={}",
        session_id,
        request.query.len()
    );

    let outcome = manager.ask(&session_id, &request.query).await?;

    Ok(Json(AskResponse { reply: outcome.reply }))
}
