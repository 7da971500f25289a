//! GET /health

use axum::Json;
use axum::extract::State;
use std::sync::Arc;

use crate::types::HealthResponse;

/// Health check: OK plus whether the authenticator has been built yet.
pub async fn health(State(state): State<Arc<crate::AppState>>) -> Json<HealthResponse> {
    let authenticator = if state.handler.is_initialized() {
        "ready"
    } else {
        "pending"
    };
    Json(HealthResponse {
        status: "ok".into(),
        mode: "edge-gateway".into(),
        authenticator: authenticator.into(),
    })
}
