use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ask", post(handlers::ask::ask_handler))
        .route(
            "/export/{format_type}/{session_id}",
            get(handlers::report::export_handler),
        )
        .with_state(state)
        // A panicking handler must not take other sessions down with it
        .layer(CatchPanicLayer::new())
        // CORS
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}
