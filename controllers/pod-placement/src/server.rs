//! Health probes and Prometheus metrics endpoint

use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::stores::Stores;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ProbeState {
    pub stores: Stores,
    pub metrics: Metrics,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<ProbeState>>) -> impl IntoResponse {
    if state.stores.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "caches not synced")
    }
}

async fn metrics(State(state): State<Arc<ProbeState>>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub fn router(state: Arc<ProbeState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the probe and metrics routes on `addr` until the process exits.
///
/// # Errors
///
/// Fails when the listener cannot bind.
pub async fn serve(addr: SocketAddr, state: Arc<ProbeState>) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Serving probes and metrics on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
