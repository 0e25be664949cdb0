//! Health and metrics handlers for the worker process.
//!
//! Reusable axum handlers for:
//! - Liveness probes (`/health`, `/healthz`)
//! - Prometheus metrics (`/metrics`)

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use queue_store::Store;

use crate::metrics;

/// Shared state for health endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Store handle the metric series are refreshed from.
    pub store: Store,
    /// Application name.
    pub app_name: String,
    /// Application version.
    pub app_version: String,
}

impl HealthState {
    pub fn new(store: Store, app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            store,
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

/// Health response for liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status (always "healthy" if responding).
    pub status: &'static str,
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
}

/// Liveness probe handler. Always returns OK if the server is running.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: state.app_name,
        version: state.app_version,
    })
}

/// Prometheus metrics endpoint handler.
///
/// Refreshes the store-derived gauges, then renders the exposition text.
pub async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    if let Err(err) = metrics::refresh_queue_metrics(&state.store).await {
        warn!(error = %err, "Failed to refresh queue metrics");
    }

    match metrics::handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not initialized. Call metrics::init_metrics() at startup.".to_string(),
        )
            .into_response(),
    }
}

/// Router with liveness and metrics endpoints.
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
