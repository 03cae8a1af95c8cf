//! Devotional generation handler

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use std::collections::HashMap;

use super::request_data;
use crate::AppState;
use spurgeon_common::{
    errors::Result,
    services::devotional::{generate_devotional, DevotionalRequest, DevotionalResponse},
};

pub async fn generate(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<DevotionalResponse>> {
    let data = request_data(query, &body)?;
    let request = DevotionalRequest::from_request(&data, &state.config)?;
    Ok(Json(generate_devotional(&state.services, request).await?))
}
