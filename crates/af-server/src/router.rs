//! Axum router construction.
//!
//! Builds the application router with routes, middleware layers, and the
//! upload body limit.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload = ctx.config.limits.max_upload_bytes as usize;

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/status", get(routes::health::status))
        .route("/convert/audio", post(routes::convert::convert_audio))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
