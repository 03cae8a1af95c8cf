//! Search handler

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
    services::search::{self, SearchRequest, SearchResponse},
};

/// Semantic search over the sermon index
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Json<SearchResponse>> {
    let data = request_data(query, &body)?;
    let request = SearchRequest::from_request(&data, &state.config)?;
    let response = search::search(&state.services, request).await?;
    Ok(Json(response))
}
