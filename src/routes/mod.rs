//! Router assembly: admin API endpoints, static dashboard bundle, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - generic resource CRUD under `/api/v1/resources/:resource`
/// - ordering, pool, session and dashboard endpoints under `/api/v1/...`
/// - the dashboard SPA from the configured static dir with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.server.static_dir.clone();
    let static_service = ServeDir::new(&static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        // Generic resources
        .route(
            "/api/v1/resources/:resource",
            get(http::http_list)
                .post(http::http_create)
                .patch(http::http_update_many)
                .delete(http::http_delete_many),
        )
        .route("/api/v1/resources/:resource/many", post(http::http_get_many))
        .route("/api/v1/resources/:resource/reference", get(http::http_reference))
        .route(
            "/api/v1/resources/:resource/:id",
            get(http::http_get_one).put(http::http_update).delete(http::http_delete),
        )
        // Ordering
        .route(
            "/api/v1/ordering/:resource",
            get(http::http_get_ordering).put(http::http_put_ordering),
        )
        .route("/api/v1/ordering/:resource/move", post(http::http_move))
        // Question pool
        .route("/api/v1/pool/count", post(http::http_pool_count))
        .route("/api/v1/pool/choices", get(http::http_pool_choices))
        .route("/api/v1/pool/resolve", post(http::http_pool_resolve))
        // Sessions
        .route("/api/v1/sessions", post(http::http_create_session))
        .route("/api/v1/sessions/:id", put(http::http_update_session))
        .route("/api/v1/sessions/:id/populate", post(http::http_populate_session))
        .route("/api/v1/dashboard", get(http::http_dashboard))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
