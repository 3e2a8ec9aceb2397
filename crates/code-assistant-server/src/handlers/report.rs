use crate::services::conversation::ConversationManager;
use crate::services::ReportFormat;
use crate::utils::error::ApiError;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

pub async fn export_handler(
    State(manager): State<Arc<ConversationManager>>,
    Path((format_type, session_id)): Path<(String, String)>,
) -> Response {
    match manager.report(&session_id, ReportFormat::parse(&format_type)) {
        Ok(report) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            report,
        )
            .into_response(),
        Err(ApiError::NotFound(msg)) => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            msg,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
