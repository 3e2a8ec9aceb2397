use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failure of a single chat-completion call. Never retried.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM API error: {status} - {body}")]
    Status { status: u16, body: String },

    #[error("LLM request timed out")]
    Timeout,

    #[error("Failed to call LLM API: {0}")]
    Transport(String),

    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Transport(e.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream error: {0}")]
    Upstream(#[from] LlmError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::Upstream(LlmError::Timeout) => {
                tracing::error!("LLM request timed out");
                (StatusCode::GATEWAY_TIMEOUT, "UpstreamTimeout", LlmError::Timeout.to_string())
            }
            ApiError::Upstream(e) => {
                tracing::error!("LLM error: {}", e);
                (StatusCode::BAD_GATEWAY, "UpstreamError", e.to_string())
            }
        };

        let body = Json(ErrorResponse { error: message, code });

        (status, body).into_response()
    }
}
