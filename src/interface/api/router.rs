//! Relay router configuration

use super::metrics_handler::metrics_handler;
use super::signaling_relay::{signaling_relay_router, SignalingRelay};
use axum::{routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Liveness check
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the relay router. `/metrics` is only mounted when a recorder is
/// installed.
pub fn build_router(relay: Arc<SignalingRelay>, prometheus_handle: Option<PrometheusHandle>) -> Router {
    // Health check route
    let health_routes = Router::new().route("/health", get(health_check));

    let mut router = Router::new()
        .merge(health_routes)
        .merge(signaling_relay_router(relay));

    // Metrics route (separate state)
    if let Some(handle) = prometheus_handle {
        let metrics_routes = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(handle);
        router = router.merge(metrics_routes);
    }

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
