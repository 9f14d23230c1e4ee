//! HTTP routes of the metrics server.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::{Router, get};
use spot_core::{ControllerStatus, StatusHandle};

use crate::prometheus::PrometheusRegistry;

/// Shared state of the routes.
#[derive(Debug, Clone)]
pub struct ServerState {
    registry: PrometheusRegistry,
    status: StatusHandle,
}

impl ServerState {
    /// Creates the state.
    #[must_use]
    pub const fn new(registry: PrometheusRegistry, status: StatusHandle) -> Self {
        Self { registry, status }
    }
}

/// Creates the router.
///
/// - `GET /metrics`: Prometheus text format
/// - `GET /healthz`: liveness probe
/// - `GET /status`: controller status as JSON
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .with_state(state)
}

async fn metrics(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, PrometheusRegistry::content_type())],
        state.registry.encode(),
    )
}

async fn healthz() -> &'static str {
    "ok"
}

async fn status(State(state): State<Arc<ServerState>>) -> Json<ControllerStatus> {
    Json(state.status.snapshot())
}
