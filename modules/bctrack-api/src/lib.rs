//! Read-only HTTP API over the tracker database, plus the cycle trigger.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use bctrack_ingest::Tracker;
use bctrack_store::Store;

pub mod rest;

pub struct AppState {
    pub store: Arc<Store>,
    pub tracker: Arc<Tracker>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/api/mentions", get(rest::api_mentions))
        .route("/api/sentiment", get(rest::api_sentiment))
        .route("/api/side-effects", get(rest::api_side_effects))
        .route("/api/side-effects/matrix", get(rest::api_effect_matrix))
        .route("/api/posts", get(rest::api_posts))
        .route("/api/posts/{id}/comments", get(rest::api_post_comments))
        .route("/api/posts/{id}/side-effects", get(rest::api_post_side_effects))
        .route("/api/errors", get(rest::api_errors))
        .route("/api/validate", get(rest::api_validate))
        .route("/api/status", get(rest::api_status))
        .route("/api/cycles", post(rest::api_trigger_cycle))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}
