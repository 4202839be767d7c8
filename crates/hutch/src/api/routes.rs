//! API route definitions.

use axum::http::Method;
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // The UI is served from a different origin in development; the API
    // itself carries no credentials.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/sandboxes", post(handlers::create_sandbox))
        .route("/sandboxes", get(handlers::list_sandboxes))
        .route("/sandboxes", delete(handlers::destroy_all_sandboxes))
        .route("/sandboxes/{session_id}", get(handlers::get_sandbox))
        .route("/sandboxes/{session_id}", delete(handlers::destroy_sandbox))
        .route("/sandboxes/{session_id}/exec", post(handlers::exec_command))
        .route("/sandboxes/{session_id}/files", get(handlers::list_files))
        .route("/sandboxes/{session_id}/files", put(handlers::write_file))
        .route(
            "/sandboxes/{session_id}/extend",
            post(handlers::extend_session),
        )
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}
