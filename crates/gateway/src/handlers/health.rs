//! Health and metrics handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: spurgeon_common::VERSION.to_string(),
    })
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
