//! Router assembly: endpoints, CORS, and the middleware stack.

use crate::api::auth::AccessGuard;
use crate::api::handlers::{
    chat, end_session, health, metrics_handler, send_message, start_session, AppState,
};
use crate::core::middleware::{request_id_middleware, MetricsMiddleware};
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

/// CORS policy mirroring the origin allow-list.
///
/// With no allow-list every origin is accepted. Otherwise the same prefix
/// predicate as the access guard decides, and credentials are allowed.
pub fn cors_layer(access: &AccessGuard) -> CorsLayer {
    if access.allows_all_origins() {
        return CorsLayer::permissive();
    }

    let access = access.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts| {
                origin
                    .to_str()
                    .map(|o| access.origin_allowed(o))
                    .unwrap_or(false)
            },
        ))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/v1/chat", post(chat))
        .route("/v1/start_session", post(start_session))
        .route("/v1/send_message", post(send_message))
        .route("/v1/end_session", post(end_session))
        .layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics));

    Router::new()
        .merge(api_routes)
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(cors_layer(&state.access))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
