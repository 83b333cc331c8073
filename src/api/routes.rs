//! Route definitions

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get};
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::handlers::proxy::MAX_REQUEST_BODY;
use super::middleware::{admission, cors_layer, request_context};
use super::server::AppState;

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .merge(admitted_routes(state.clone()))
        // Read-only views are not counted against the caller
        .route("/stats", get(handlers::stats::own_stats))
        .route("/stats/:ip", get(handlers::stats::client_stats))
        .route("/health", get(handlers::health::health_check))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY))
        .layer(cors)
        .layer(axum::middleware::from_fn(request_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes that pass through the admission guard
fn admitted_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::link::create_link).post(handlers::link::create_link),
        )
        .route("/proxy", any(handlers::proxy::proxy))
        .route_layer(axum::middleware::from_fn_with_state(state, admission))
}
