use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// All API routes with permissive CORS and request tracing.
pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/chat", post(handlers::chat))
        .route("/upload_documents", post(handlers::upload_documents))
        .route("/clear_documents", post(handlers::clear_documents))
        .route("/context", post(handlers::context))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
