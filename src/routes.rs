//! HTTP router assembly.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware, state::AppState};

/// Room for multipart boundaries and the `url` field on top of the feed itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the application router.
///
/// Only `/validate` passes through admission (API key + rate limits); the
/// onboarding and health routes are public.
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_feed_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let admitted_routes = Router::new()
        .route("/validate", post(handlers::validate::validate))
        // Apply admission middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admission::admission_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        // Public routes
        .route("/health", get(handlers::health::health_check))
        .route("/request-key", post(handlers::keys::request_key))
        .route("/verify-email", get(handlers::keys::verify_email))
        .merge(admitted_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
