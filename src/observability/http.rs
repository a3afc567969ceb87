//! Admin HTTP surface: Prometheus scrape endpoint and liveness signal.
//!
//! Only bound in continuous mode; one-shot runs report through their exit
//! code instead.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::HealthWindow;
use crate::errors::{Error, Result};

use super::metrics::Metrics;

/// Shared state for the admin routes.
#[derive(Clone)]
pub struct AdminState {
    pub metrics: Arc<Metrics>,
    pub prometheus: PrometheusHandle,
    pub health_window: HealthWindow,
}

/// Health check response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub session_errors: u64,
}

/// Build the admin router with `/metrics` and `/health`.
pub fn build_router(state: AdminState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<AdminState>) -> String {
    state.prometheus.render()
}

/// Liveness signal: `200 OK` while the session signal is healthy under the
/// configured window, `503` once degraded.
async fn health_handler(State(state): State<AdminState>) -> (StatusCode, Json<HealthResponse>) {
    let session_errors = state.metrics.session_errors();
    if state.metrics.is_healthy(state.health_window) {
        (StatusCode::OK, Json(HealthResponse { status: "ok", session_errors }))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse { status: "degraded", session_errors }))
    }
}

/// Serve the admin routes until the shutdown token fires.
pub async fn serve(addr: SocketAddr, state: AdminState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::io(e, format!("binding admin endpoints on {}", addr)))?;

    info!(address = %addr, "admin endpoints listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::admin_server(e.to_string()))
}
