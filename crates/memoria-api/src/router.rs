//! Wires handlers into an axum `Router`: a versioned API surface nested
//! under `/api/v1`, unauthenticated health/version routes at the root, and
//! a tracing layer wrapping the whole thing. Auth and rate limiting are
//! dropped (out of scope).

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/upload", post(handlers::upload))
        .route("/upload-status", get(handlers::upload_status))
        .route("/documents", delete(handlers::delete_document))
        .route("/indexes", get(handlers::list_indexes).delete(handlers::delete_index))
        .route("/search", post(handlers::search))
        .route("/ask", post(handlers::ask));

    let health_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version));

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
